//! Static tables for the Karu core library: type names offered after `:`,
//! the keyword list, and predefined members of the built-in types.

/// Type names offered when completing after a `:` annotation.
pub const TYPE_NAMES: &[&str] = &[
    "Any", "Ary", "Array", "Bin", "Binary", "Dbl", "Double", "Func", "Function", "Int",
    "Integer", "Nul", "Obj", "Object", "Str", "String",
];

pub const KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "default", "do", "else", "enum",
    "false", "finally", "for", "function", "if", "import", "in", "mixin", "module", "native",
    "new", "null", "private", "public", "return", "super", "switch", "this", "throw", "true",
    "try", "using", "var", "while", "yield",
];

/// Predefined members of a built-in type: `(name, one-line signature)`.
type Member = (&'static str, &'static str);

const INTEGER_MEMBERS: &[Member] = &[
    ("downto", "downto(n, func): Any"),
    ("times", "times(func): Any"),
    ("toDouble", "toDouble(): Dbl"),
    ("toString", "toString(base): Str"),
    ("upto", "upto(n, func): Any"),
];

const DOUBLE_MEMBERS: &[Member] = &[
    ("abs", "abs(): Dbl"),
    ("ceil", "ceil(): Int"),
    ("floor", "floor(): Int"),
    ("round", "round(): Int"),
    ("toInt", "toInt(): Int"),
    ("toString", "toString(): Str"),
];

const STRING_MEMBERS: &[Member] = &[
    ("find", "find(needle): Int"),
    ("length", "length(): Int"),
    ("replace", "replace(pattern, replacement): Str"),
    ("split", "split(separator): Ary"),
    ("subString", "subString(start, length): Str"),
    ("toDouble", "toDouble(): Dbl"),
    ("toInt", "toInt(): Int"),
    ("toLower", "toLower(): Str"),
    ("toUpper", "toUpper(): Str"),
    ("trim", "trim(): Str"),
];

const BINARY_MEMBERS: &[Member] = &[
    ("length", "length(): Int"),
    ("toString", "toString(): Str"),
];

const ARRAY_MEMBERS: &[Member] = &[
    ("each", "each(func): Any"),
    ("filter", "filter(func): Ary"),
    ("flatten", "flatten(): Ary"),
    ("join", "join(separator): Str"),
    ("length", "length(): Int"),
    ("map", "map(func): Ary"),
    ("pop", "pop(): Any"),
    ("push", "push(item): Ary"),
    ("reduce", "reduce(func, initial): Any"),
    ("reverse", "reverse(): Ary"),
    ("shift", "shift(): Any"),
    ("sort", "sort(comparator): Ary"),
    ("unshift", "unshift(item): Ary"),
];

const OBJECT_MEMBERS: &[Member] = &[
    ("keys", "keys(): Ary"),
    ("toJsonString", "toJsonString(): Str"),
];

/// Predefined members for a built-in type name or its short alias.
/// Empty for user-defined (or unknown) types.
pub fn members_of(type_name: &str) -> &'static [Member] {
    match type_name {
        "Int" | "Integer" => INTEGER_MEMBERS,
        "Dbl" | "Double" => DOUBLE_MEMBERS,
        "Str" | "String" => STRING_MEMBERS,
        "Bin" | "Binary" => BINARY_MEMBERS,
        "Ary" | "Array" => ARRAY_MEMBERS,
        "Obj" | "Object" => OBJECT_MEMBERS,
        _ => &[],
    }
}
