//! Canonical type names.
//!
//! Composite names are plain strings (`array<variant<int; string>>`) so they
//! can be used as registry keys and printed in error reports. Internally every
//! name is parsed into a [`TypeExpr`] first; the builders below go through the
//! parsed form, which keeps the rendered strings canonical no matter how the
//! inputs were spaced.
use std::fmt;

use crate::error::SchemaError;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

pub const ANY: &str = "*";
pub const UNDEFINED: &str = "undefined";
pub const INFINITY: &str = "Infinity";

/// Heads of the composite forms. None of these can be registered as a name.
pub const CONSTRUCTORS: &[&str] = &["array", "variant", "tuple", "boundedInt", "formattedString"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// `*`
    Any,
    /// A registered name (`int`, `requiredString`, `knexClients`, ...).
    Named(String),
    /// `array` or `array<T>`
    Array(Option<Box<TypeExpr>>),
    /// `variant<A; B>`
    Variant(Vec<TypeExpr>),
    /// `tuple<A; B>`, exact arity
    Tuple(Vec<TypeExpr>),
    /// `boundedInt<min;max>`, inclusive; `max: None` is `Infinity`
    BoundedInt { min: i64, max: Option<i64> },
    /// `formattedString<pattern>`, pattern kept verbatim
    FormattedString(String),
    /// `[T]`, an omittable positional parameter
    Optional(Box<TypeExpr>),
    /// `A, B => O`
    Function { inputs: Vec<TypeExpr>, output: Box<TypeExpr> },
}

// ————————————————————————————————————————————————————————————————————————————
// PARSING
// ————————————————————————————————————————————————————————————————————————————

/// Deepest `<...>` / `[...]` / `=>` nesting a name may have.
pub const MAX_NESTING: usize = 64;

/// Head whose `<...>` body is a regex rather than a type list.
const PATTERN_HEAD: &[u8] = b"formattedString";

impl TypeExpr {
    pub fn parse(src: &str) -> Result<Self, SchemaError> {
        check_balanced(src)?;
        parse_nested(src, 0)
    }

    /// Every registered name this expression refers to, in order of appearance.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeExpr::Named(name) => out.push(name),
            TypeExpr::Array(Some(inner)) | TypeExpr::Optional(inner) => inner.collect_names(out),
            TypeExpr::Variant(items) | TypeExpr::Tuple(items) => {
                items.iter().for_each(|t| t.collect_names(out))
            }
            TypeExpr::Function { inputs, output } => {
                inputs.iter().for_each(|t| t.collect_names(out));
                output.collect_names(out);
            }
            TypeExpr::Any
            | TypeExpr::Array(None)
            | TypeExpr::BoundedInt { .. }
            | TypeExpr::FormattedString(_) => {}
        }
    }
}

/// `src` has already passed [`check_balanced`].
fn parse_nested(src: &str, level: usize) -> Result<TypeExpr, SchemaError> {
    let src = src.trim();
    if src.is_empty() {
        return Err(SchemaError::argument("type name is empty"));
    }
    if level > MAX_NESTING {
        return Err(too_deep(src));
    }
    let level = level + 1;

    if let Some(at) = find_arrow(src) {
        let head = src[..at].trim();
        let inputs = if head.is_empty() {
            Vec::new()
        } else {
            split_top_level(head, &[b','])?
                .into_iter()
                .map(|input| parse_nested(input, level))
                .collect::<Result<Vec<_>, _>>()?
        };
        let output = parse_nested(&src[at + 2..], level)?;
        return Ok(TypeExpr::Function { inputs, output: Box::new(output) });
    }

    if let Some(inner) = src.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return Ok(TypeExpr::Optional(Box::new(parse_nested(inner, level)?)));
    }

    if src == ANY {
        return Ok(TypeExpr::Any);
    }

    if let Some(open) = src.find('<') {
        let head = &src[..open];
        let Some(inner) = src[open + 1..].strip_suffix('>') else {
            return Err(SchemaError::argument(format!("`{src}` has trailing text after `>`")));
        };
        return match head {
            "array" => Ok(TypeExpr::Array(Some(Box::new(parse_nested(inner, level)?)))),
            "variant" => Ok(TypeExpr::Variant(parse_list(inner, level)?)),
            "tuple" => Ok(TypeExpr::Tuple(parse_list(inner, level)?)),
            "boundedInt" => parse_bounds(inner),
            "formattedString" if !inner.is_empty() => {
                Ok(TypeExpr::FormattedString(inner.to_string()))
            }
            "formattedString" => Err(SchemaError::argument("formattedString needs a pattern")),
            _ => Err(SchemaError::argument(format!("unknown type constructor `{head}` in `{src}`"))),
        };
    }

    if src == "array" {
        return Ok(TypeExpr::Array(None));
    }
    if src.chars().any(|c| c.is_whitespace() || "<>;,[]".contains(c)) {
        return Err(SchemaError::argument(format!("`{src}` is not a well-formed type name")));
    }
    Ok(TypeExpr::Named(src.to_string()))
}

fn parse_list(inner: &str, level: usize) -> Result<Vec<TypeExpr>, SchemaError> {
    split_top_level(inner, &[b';'])?
        .into_iter()
        .map(|item| parse_nested(item, level))
        .collect()
}

fn parse_bounds(inner: &str) -> Result<TypeExpr, SchemaError> {
    // Some hand-written names use `,` between the bounds.
    let parts = split_top_level(inner, &[b';', b','])?;
    let bad = || SchemaError::argument(format!("`boundedInt<{inner}>` needs integer bounds"));
    let (min, max) = match parts.as_slice() {
        [min] => (*min, INFINITY),
        [min, max] => (*min, *max),
        _ => return Err(bad()),
    };
    let min = min.parse::<i64>().map_err(|_| bad())?;
    let max = match max {
        INFINITY => None,
        other => Some(other.parse::<i64>().map_err(|_| bad())?),
    };
    if max.is_some_and(|max| max < min) {
        return Err(SchemaError::argument(format!("`boundedInt<{inner}>` has max below min")));
    }
    Ok(TypeExpr::BoundedInt { min, max })
}

fn too_deep(src: &str) -> SchemaError {
    let shown: String = src.chars().take(40).collect();
    SchemaError::argument(format!("`{shown}...` nests deeper than {MAX_NESTING} levels"))
}

// ————————————————————————————————————————————————————————————————————————————
// SCANNING
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Arrow,
    Byte(u8),
}

/// Structural tokens of a name, each with the `<` depth in front of it.
///
/// Inside a `formattedString<...>` body only `<` and `>` are structure; a
/// `=>` there is regex text.
struct Tokens<'a> {
    bytes: &'a [u8],
    at: usize,
    depth: usize,
    /// Depth of the pattern body being scanned, if any.
    pattern: Option<usize>,
}

fn tokens(src: &str) -> Tokens<'_> {
    Tokens { bytes: src.as_bytes(), at: 0, depth: 0, pattern: None }
}

impl Iterator for Tokens<'_> {
    type Item = (usize, Token, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let at = self.at;
        let rest = self.bytes.get(at..).filter(|rest| !rest.is_empty())?;
        let depth = self.depth;
        if self.pattern.is_none() && rest.starts_with(b"=>") {
            self.at += 2;
            return Some((at, Token::Arrow, depth));
        }
        self.at += 1;
        let token = match rest[0] {
            b'<' => {
                self.depth += 1;
                if self.pattern.is_none() && self.bytes[..at].ends_with(PATTERN_HEAD) {
                    self.pattern = Some(self.depth);
                }
                Token::Open
            }
            b'>' => {
                if self.pattern == Some(self.depth) {
                    self.pattern = None;
                }
                self.depth = self.depth.saturating_sub(1);
                Token::Close
            }
            b => Token::Byte(b),
        };
        Some((at, token, depth))
    }
}

/// `<` / `>` nesting, bounded by [`MAX_NESTING`]. Runs once per name, in
/// linear time, before any recursion.
fn check_balanced(src: &str) -> Result<(), SchemaError> {
    let mut depth = 0;
    for (_, token, before) in tokens(src) {
        depth = match token {
            Token::Open if before >= MAX_NESTING => return Err(too_deep(src)),
            Token::Open => before + 1,
            Token::Close if before == 0 => {
                return Err(SchemaError::argument(format!("unbalanced `>` in `{src}`")));
            }
            Token::Close => before - 1,
            Token::Arrow | Token::Byte(_) => before,
        };
    }
    if depth != 0 {
        return Err(SchemaError::argument(format!("unbalanced `<` in `{src}`")));
    }
    Ok(())
}

fn find_arrow(src: &str) -> Option<usize> {
    tokens(src).find_map(|(at, token, depth)| (token == Token::Arrow && depth == 0).then_some(at))
}

fn split_top_level<'a>(src: &'a str, separators: &[u8]) -> Result<Vec<&'a str>, SchemaError> {
    let mut out = Vec::new();
    let mut start = 0;
    for (at, token, depth) in tokens(src) {
        match token {
            Token::Byte(b) if depth == 0 && separators.contains(&b) => {
                out.push(&src[start..at]);
                start = at + 1;
            }
            _ => {}
        }
    }
    out.push(&src[start..]);

    let out: Vec<&str> = out.into_iter().map(str::trim).collect();
    if out.iter().any(|piece| piece.is_empty()) {
        return Err(SchemaError::argument(format!("empty entry in type list `{src}`")));
    }
    Ok(out)
}

// ————————————————————————————————————————————————————————————————————————————
// RENDERING
// ————————————————————————————————————————————————————————————————————————————

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[TypeExpr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Any => f.write_str(ANY),
            TypeExpr::Named(name) => f.write_str(name),
            TypeExpr::Array(None) => f.write_str("array"),
            TypeExpr::Array(Some(inner)) => write!(f, "array<{inner}>"),
            TypeExpr::Variant(items) => {
                f.write_str("variant<")?;
                write_joined(f, items, "; ")?;
                f.write_str(">")
            }
            TypeExpr::Tuple(items) => {
                f.write_str("tuple<")?;
                write_joined(f, items, "; ")?;
                f.write_str(">")
            }
            TypeExpr::BoundedInt { min, max: Some(max) } => write!(f, "boundedInt<{min};{max}>"),
            TypeExpr::BoundedInt { min, max: None } => write!(f, "boundedInt<{min};{INFINITY}>"),
            TypeExpr::FormattedString(pattern) => write!(f, "formattedString<{pattern}>"),
            TypeExpr::Optional(inner) => write!(f, "[{inner}]"),
            TypeExpr::Function { inputs, output } if inputs.is_empty() => write!(f, "=> {output}"),
            TypeExpr::Function { inputs, output } => {
                write_joined(f, inputs, ", ")?;
                write!(f, " => {output}")
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BUILDERS
// ————————————————————————————————————————————————————————————————————————————

/// One type name or a list of them.
pub trait IntoTypeList {
    fn into_type_list(self) -> Vec<String>;
}

impl IntoTypeList for &str {
    fn into_type_list(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoTypeList for String {
    fn into_type_list(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoTypeList for &String {
    fn into_type_list(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<S: AsRef<str>> IntoTypeList for &[S] {
    fn into_type_list(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> IntoTypeList for [S; N] {
    fn into_type_list(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>> IntoTypeList for Vec<S> {
    fn into_type_list(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

fn parse_all(types: impl IntoTypeList) -> Result<Vec<TypeExpr>, SchemaError> {
    let types = types.into_type_list();
    if types.is_empty() {
        return Err(SchemaError::argument("type list is empty"));
    }
    types.iter().map(|t| TypeExpr::parse(t)).collect()
}

/// `array` when no element type is given, `array<T>` otherwise.
pub fn array_of(element: Option<&str>) -> Result<String, SchemaError> {
    let element = element.map(TypeExpr::parse).transpose()?.map(Box::new);
    Ok(TypeExpr::Array(element).to_string())
}

/// `variant<A; B>`. A lone name gives the same string as a one-element list.
pub fn variant_of(types: impl IntoTypeList) -> Result<String, SchemaError> {
    Ok(TypeExpr::Variant(parse_all(types)?).to_string())
}

pub fn tuple_of(types: impl IntoTypeList) -> Result<String, SchemaError> {
    Ok(TypeExpr::Tuple(parse_all(types)?).to_string())
}

/// Inclusive integer range; `max: None` is unbounded above.
pub fn bounded_int(min: i64, max: Option<i64>) -> Result<String, SchemaError> {
    if max.is_some_and(|max| max < min) {
        return Err(SchemaError::argument(format!("bounded int max {max:?} is below min {min}")));
    }
    Ok(TypeExpr::BoundedInt { min, max }.to_string())
}

/// The pattern is used as authored; it must keep `<`/`>` balanced so the
/// name still nests.
pub fn formatted_string(pattern: &str) -> Result<String, SchemaError> {
    if pattern.is_empty() {
        return Err(SchemaError::argument("formatted string pattern is empty"));
    }
    let expr = TypeExpr::FormattedString(pattern.to_string());
    let rendered = expr.to_string();
    if TypeExpr::parse(&rendered)? != expr {
        return Err(SchemaError::argument(format!("pattern `{pattern}` does not nest inside a type name")));
    }
    Ok(rendered)
}

pub fn optional_parameter(ty: &str) -> Result<String, SchemaError> {
    Ok(TypeExpr::Optional(Box::new(TypeExpr::parse(ty)?)).to_string())
}

/// A field that may be absent or of type `ty`.
pub fn optional_property(ty: &str) -> Result<String, SchemaError> {
    variant_of([UNDEFINED, ty])
}

/// Descriptive only; see [`crate::enforce`] for checking calls against it.
/// An empty input list gives a nullary signature, `=> O`.
pub fn function_type(inputs: impl IntoTypeList, output: &str) -> Result<String, SchemaError> {
    let inputs = inputs
        .into_type_list()
        .iter()
        .map(|input| TypeExpr::parse(input))
        .collect::<Result<Vec<_>, _>>()?;
    let output = Box::new(TypeExpr::parse(output)?);
    Ok(TypeExpr::Function { inputs, output }.to_string())
}

/// Anchored alternation over `values`. Values are not escaped.
pub fn string_enum<S: AsRef<str>>(values: &[S]) -> Result<String, SchemaError> {
    if values.is_empty() {
        return Err(SchemaError::argument("string enum needs at least one value"));
    }
    if values.iter().any(|v| v.as_ref().is_empty()) {
        return Err(SchemaError::argument("string enum values must not be empty"));
    }
    let alternation = values.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("|");
    formatted_string(&format!("^({alternation})$"))
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_names() {
        let inner = variant_of(["a", "b"]).unwrap();
        assert_eq!(array_of(Some(inner.as_str())).unwrap(), "array<variant<a; b>>");
        assert_eq!(variant_of(["int", "boolean", "string"]).unwrap(), "variant<int; boolean; string>");
        assert_eq!(array_of(None).unwrap(), "array");
        assert_eq!(array_of(Some("int")).unwrap(), "array<int>");
    }

    #[test]
    fn single_name_variant_matches_singleton_list() {
        assert_eq!(variant_of("number").unwrap(), variant_of(["number"]).unwrap());
        assert_eq!(variant_of("number").unwrap(), "variant<number>");
        assert_eq!(tuple_of("int").unwrap(), tuple_of(vec!["int"]).unwrap());
    }

    #[test]
    fn tuples_and_bounds() {
        assert_eq!(tuple_of(["string", "int", "object"]).unwrap(), "tuple<string; int; object>");
        assert_eq!(bounded_int(0, Some(100)).unwrap(), "boundedInt<0;100>");
        assert_eq!(bounded_int(0, None).unwrap(), "boundedInt<0;Infinity>");
        assert!(bounded_int(5, Some(1)).is_err());
    }

    #[test]
    fn documentation_forms() {
        assert_eq!(formatted_string(".*").unwrap(), "formattedString<.*>");
        assert_eq!(optional_parameter("boolean").unwrap(), "[boolean]");
        assert_eq!(optional_property("string").unwrap(), "variant<undefined; string>");
        assert_eq!(function_type("string", "int").unwrap(), "string => int");
        assert_eq!(function_type(["int", "boolean", "string"], "*").unwrap(), "int, boolean, string => *");
    }

    #[test]
    fn string_enum_is_anchored_alternation() {
        assert_eq!(
            string_enum(&["hello", "world", "blue"]).unwrap(),
            "formattedString<^(hello|world|blue)$>"
        );
        assert!(string_enum::<&str>(&[]).is_err());
    }

    #[test]
    fn builders_canonicalise_spacing() {
        assert_eq!(array_of(Some("variant<int;string>")).unwrap(), "array<variant<int; string>>");
        assert_eq!(variant_of(["tuple<int ;  string>", "int"]).unwrap(), "variant<tuple<int; string>; int>");
    }

    #[test]
    fn malformed_inputs_are_argument_errors() {
        for bad in ["", "  ", "bat type", "array<int", "variant<>", "variant<int;;string>", "int>"] {
            assert!(
                matches!(TypeExpr::parse(bad), Err(SchemaError::Argument(_))),
                "`{bad}` should not parse"
            );
        }
        assert!(variant_of(Vec::<String>::new()).is_err());
        assert!(formatted_string("a<b").is_err());
        assert!(array_of(Some("list<int>")).is_err());
    }

    #[test]
    fn parses_every_form() {
        let expr = TypeExpr::parse("variant<undefined; array<boundedInt<0;255>>; tuple<int; *>>").unwrap();
        assert_eq!(
            expr,
            TypeExpr::Variant(vec![
                TypeExpr::Named("undefined".into()),
                TypeExpr::Array(Some(Box::new(TypeExpr::BoundedInt { min: 0, max: Some(255) }))),
                TypeExpr::Tuple(vec![TypeExpr::Named("int".into()), TypeExpr::Any]),
            ])
        );
        assert_eq!(
            TypeExpr::parse("int, [string] => boolean").unwrap(),
            TypeExpr::Function {
                inputs: vec![
                    TypeExpr::Named("int".into()),
                    TypeExpr::Optional(Box::new(TypeExpr::Named("string".into()))),
                ],
                output: Box::new(TypeExpr::Named("boolean".into())),
            }
        );
    }

    #[test]
    fn comma_separated_bounds_are_accepted() {
        let expr = TypeExpr::parse("boundedInt<0, 255>").unwrap();
        assert_eq!(expr.to_string(), "boundedInt<0;255>");
    }

    #[test]
    fn pattern_with_separators_nests() {
        let pattern = formatted_string("^(a;b|c,d)$").unwrap();
        let variant = variant_of(["int", pattern.as_str()]).unwrap();
        assert_eq!(variant, "variant<int; formattedString<^(a;b|c,d)$>>");
        match TypeExpr::parse(&variant).unwrap() {
            TypeExpr::Variant(items) => {
                assert_eq!(items[1], TypeExpr::FormattedString("^(a;b|c,d)$".into()))
            }
            other => panic!("expected variant, got {other:?}"),
        }
    }

    #[test]
    fn names_lists_references() {
        let expr = TypeExpr::parse("variant<requiredString; array<octet>; boundedInt<0;1>>").unwrap();
        assert_eq!(expr.names(), vec!["requiredString", "octet"]);
    }

    #[test]
    fn patterns_may_end_in_equals() {
        assert_eq!(formatted_string("^key=").unwrap(), "formattedString<^key=>");
        let variant = variant_of(["int", "formattedString<^key=>"]).unwrap();
        assert_eq!(variant, "variant<int; formattedString<^key=>>");
        match TypeExpr::parse(&variant).unwrap() {
            TypeExpr::Variant(items) => assert_eq!(items[1], TypeExpr::FormattedString("^key=".into())),
            other => panic!("expected variant, got {other:?}"),
        }
        assert_eq!(
            TypeExpr::parse("formattedString<a=>b> => int").unwrap(),
            TypeExpr::Function {
                inputs: vec![TypeExpr::FormattedString("a=>b".into())],
                output: Box::new(TypeExpr::Named("int".into())),
            }
        );
    }

    #[test]
    fn nesting_is_bounded() {
        let within = format!("{}int{}", "array<".repeat(MAX_NESTING), ">".repeat(MAX_NESTING));
        assert!(TypeExpr::parse(&within).is_ok());

        let deep = [
            format!("{}int{}", "array<".repeat(200_000), ">".repeat(200_000)),
            format!("{}int{}", "[".repeat(200_000), "]".repeat(200_000)),
            format!("{}int", "int => ".repeat(200_000)),
        ];
        for name in &deep {
            assert!(matches!(TypeExpr::parse(name), Err(SchemaError::Argument(_))));
        }
    }

    #[test]
    fn nullary_function_types() {
        assert_eq!(function_type(Vec::<String>::new(), "int").unwrap(), "=> int");
        let expr = TypeExpr::parse("=> int").unwrap();
        assert_eq!(expr, TypeExpr::Function { inputs: Vec::new(), output: Box::new(TypeExpr::Named("int".into())) });
        assert_eq!(expr.to_string(), "=> int");
        assert!(TypeExpr::parse(" => int").is_ok());
    }
}
