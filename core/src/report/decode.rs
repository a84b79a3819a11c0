use once_cell::sync::Lazy;
use regex::Regex;

use super::event::{
    DefineKind, DiagnosticLine, Event, RefKind, ReportLine, ScopeKind, TypeNote,
};

static SYMBOL_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Symbol\(([^)]+)\).+?<([^>]+)>:(\d+)").unwrap());
static PLAIN_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r".+?<([^>]+)>:(\d+)").unwrap());

/// Classifies one report line.
///
/// Returns `None` for empty lines and for anything matching neither the tag
/// grammar nor one of the two diagnostic shapes; such lines are dropped.
pub fn decode_line(line: &str) -> Option<ReportLine> {
    if line.is_empty() {
        return None;
    }
    if line.starts_with('#') {
        let event = decode_tag(line);
        if event.is_none() {
            log::debug!("dropping malformed tag line: {line}");
        }
        return event.map(ReportLine::Event);
    }
    decode_diagnostic(line).map(ReportLine::Diagnostic)
}

fn decode_tag(line: &str) -> Option<Event> {
    let fields: Vec<&str> = line.split('\t').collect();
    match fields[0] {
        "#define" => {
            let kind = DefineKind::parse(fields.get(1)?)?;
            Some(Event::Define {
                kind,
                name: (*fields.get(2)?).to_string(),
                file: (*fields.get(3)?).to_string(),
                line: line_number(fields.get(4)?)?,
                note: fields.get(5).map(|f| TypeNote::parse(f)),
            })
        }
        "#ref" => {
            let kind = match *fields.get(1)? {
                "var" => RefKind::Var,
                "key" => RefKind::Key,
                _ => return None,
            };
            let name = (*fields.get(2)?).to_string();
            let file = (*fields.get(3)?).to_string();
            let line_no = line_number(fields.get(4)?)?;
            // optional definition pair, then optional type note
            let (def, note) = match fields.len() {
                5 => (None, None),
                6 => (None, Some(TypeNote::parse(fields[5]))),
                7 => (
                    Some((fields[5].to_string(), line_number(fields[6])?)),
                    None,
                ),
                8 => (
                    Some((fields[5].to_string(), line_number(fields[6])?)),
                    Some(TypeNote::parse(fields[7])),
                ),
                _ => return None,
            };
            Some(Event::Ref {
                kind,
                name,
                file,
                line: line_no,
                def,
                note,
            })
        }
        "#call" => {
            let (scope, name) = match fields.get(1)?.rsplit_once('#') {
                Some((scope, name)) => (Some(scope.to_string()), name.to_string()),
                None => (None, (*fields.get(1)?).to_string()),
            };
            Some(Event::Call {
                scope,
                name,
                file: (*fields.get(2)?).to_string(),
                line: line_number(fields.get(3)?)?,
                def_file: (*fields.get(4)?).to_string(),
                def_line: line_number(fields.get(5)?)?,
            })
        }
        "#callarg" => Some(Event::CallArg {
            index: fields.get(1)?.parse().ok()?,
            ty: (*fields.get(2).unwrap_or(&"")).to_string(),
        }),
        "#callend" => Some(Event::CallEnd),
        "#vartype" => Some(Event::VarType {
            name: (*fields.get(1)?).to_string(),
            ty: (*fields.get(2)?).to_string(),
        }),
        "#scope" => {
            let kind = match *fields.get(2)? {
                "function" => ScopeKind::Function,
                "class" => ScopeKind::Class,
                _ => return None,
            };
            let name = fields.get(3).map(|s| s.to_string());
            match *fields.get(1)? {
                "start" => Some(Event::ScopeStart { kind, name }),
                "end" => Some(Event::ScopeEnd { kind, name }),
                _ => None,
            }
        }
        "#method" => {
            let (class, method) = fields.get(1)?.rsplit_once('#')?;
            Some(Event::Method {
                class: class.to_string(),
                method: method.to_string(),
                file: (*fields.get(2)?).to_string(),
                line: line_number(fields.get(3)?)?,
                start: fields.get(4)?.parse().ok()?,
                end: fields.get(5)?.parse().ok()?,
            })
        }
        "#arg" => Some(Event::Arg {
            index: fields.get(1)?.parse().ok()?,
            ty: (*fields.get(2).unwrap_or(&"")).to_string(),
        }),
        _ => None,
    }
}

fn decode_diagnostic(line: &str) -> Option<DiagnosticLine> {
    if let Some(caps) = SYMBOL_LINE_RE.captures(line) {
        return Some(DiagnosticLine {
            message: line.to_string(),
            symbol: Some(caps[1].to_string()),
            file: caps[2].to_string(),
            line: line_number(&caps[3])?,
        });
    }
    let caps = PLAIN_LINE_RE.captures(line)?;
    Some(DiagnosticLine {
        message: line.to_string(),
        symbol: None,
        file: caps[1].to_string(),
        line: line_number(&caps[2])?,
    })
}

/// The report uses 1-based line numbers; everything downstream is 0-based.
fn line_number(field: &str) -> Option<u32> {
    let n: u32 = field.parse().ok()?;
    Some(n.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CallMark;

    #[test]
    fn define_with_return_type() {
        let got = decode_line("#define\tfunction\tf\tmain.k\t3\tFunction#Int");
        assert_eq!(
            got,
            Some(ReportLine::Event(Event::Define {
                kind: DefineKind::Function,
                name: "f".into(),
                file: "main.k".into(),
                line: 2,
                note: Some(TypeNote {
                    mark: Some(CallMark::Function),
                    name: "Int".into()
                }),
            }))
        );
    }

    #[test]
    fn class_supertype_is_a_bare_note() {
        let got = decode_line("#define\tclass\tB\tmain.k\t1\tA");
        match got {
            Some(ReportLine::Event(Event::Define { kind, note, .. })) => {
                assert_eq!(kind, DefineKind::Class);
                let note = note.unwrap();
                assert!(!note.callable());
                assert_eq!(note.name, "A");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn ref_with_definition_pair() {
        let got = decode_line("#ref\tvar\tx\tmain.k\t5\tmain.k\t1");
        assert_eq!(
            got,
            Some(ReportLine::Event(Event::Ref {
                kind: RefKind::Var,
                name: "x".into(),
                file: "main.k".into(),
                line: 4,
                def: Some(("main.k".into(), 0)),
                note: None,
            }))
        );
    }

    #[test]
    fn ref_with_definition_and_type() {
        let got = decode_line("#ref\tvar\tf\tmain.k\t5\tlib.k\t2\tFunction#Str");
        match got {
            Some(ReportLine::Event(Event::Ref { def, note, .. })) => {
                assert_eq!(def, Some(("lib.k".into(), 1)));
                assert!(note.unwrap().callable());
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn call_with_class_scope() {
        let got = decode_line("#call\tA#m\tmain.k\t4\tmain.k\t2");
        assert_eq!(
            got,
            Some(ReportLine::Event(Event::Call {
                scope: Some("A".into()),
                name: "m".into(),
                file: "main.k".into(),
                line: 3,
                def_file: "main.k".into(),
                def_line: 1,
            }))
        );
    }

    #[test]
    fn scope_and_args() {
        assert_eq!(
            decode_line("#scope\tstart\tfunction\tf"),
            Some(ReportLine::Event(Event::ScopeStart {
                kind: ScopeKind::Function,
                name: Some("f".into())
            }))
        );
        assert_eq!(
            decode_line("#arg\t0\tInt"),
            Some(ReportLine::Event(Event::Arg {
                index: 0,
                ty: "Int".into()
            }))
        );
        assert_eq!(decode_line("#callend"), Some(ReportLine::Event(Event::CallEnd)));
    }

    #[test]
    fn method_reference() {
        assert_eq!(
            decode_line("#method\tA#m\tmain.k\t7\t4\t5"),
            Some(ReportLine::Event(Event::Method {
                class: "A".into(),
                method: "m".into(),
                file: "main.k".into(),
                line: 6,
                start: 4,
                end: 5,
            }))
        );
    }

    #[test]
    fn diagnostic_shapes() {
        let plain = decode_line("unexpected token near '}' <main.k>:12");
        assert_eq!(
            plain,
            Some(ReportLine::Diagnostic(DiagnosticLine {
                message: "unexpected token near '}' <main.k>:12".into(),
                symbol: None,
                file: "main.k".into(),
                line: 11,
            }))
        );
        let symbol = decode_line("Symbol(x) is not defined <main.k>:3");
        match symbol {
            Some(ReportLine::Diagnostic(d)) => {
                assert_eq!(d.symbol.as_deref(), Some("x"));
                assert_eq!(d.line, 2);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn junk_is_dropped() {
        assert_eq!(decode_line(""), None);
        assert_eq!(decode_line("#bogus\t1\t2"), None);
        assert_eq!(decode_line("#define\tvar"), None);
        assert_eq!(decode_line("no location in this line"), None);
    }
}
