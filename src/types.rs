//! The type system: type representation, numeric widening, assignment
//! compatibility, and the built-in function overload table.

use std::fmt;

use once_cell::sync::Lazy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Integer,
    Real,
    Boolean,
    Char,
    String,
    Array {
        lo: i64,
        hi: i64,
        element: Box<Type>,
    },
}

impl Type {
    pub fn array(lo: i64, hi: i64, element: Type) -> Type {
        Type::Array {
            lo,
            hi,
            element: Box::new(element),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer => write!(f, "integer"),
            Type::Real => write!(f, "real"),
            Type::Boolean => write!(f, "boolean"),
            Type::Char => write!(f, "char"),
            Type::String => write!(f, "string"),
            Type::Array { lo, hi, element } => {
                write!(f, "array[{lo}..{hi}] of {element}")
            }
        }
    }
}

/// Formats a list of argument types the way call-site diagnostics want
/// them: `[integer, real]`.
pub fn fmt_sig_args(types: &[Type]) -> String {
    let parts: Vec<String> = types.iter().map(|t| t.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

pub fn is_numeric(t: &Type) -> bool {
    matches!(t, Type::Integer | Type::Real)
}

/// Pascal's widening rule: mixing integer and real promotes to real.
pub fn numeric_result(t1: &Type, t2: &Type) -> Type {
    if *t1 == Type::Real || *t2 == Type::Real {
        Type::Real
    } else {
        Type::Integer
    }
}

/// Assignment compatibility: identical types, or `real := integer`.
/// No other implicit widenings exist in this subset.
pub fn assign_compat(lhs: &Type, rhs: &Type) -> bool {
    lhs == rhs || (*lhs == Type::Real && *rhs == Type::Integer)
}

/// One parameter slot in a built-in function's signature: either an
/// exact type or one of the generic matchers the overload table uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamMatcher {
    Exact(Type),
    Numeric,
    StringOrArray,
}

impl ParamMatcher {
    fn matches(&self, got: &Type) -> bool {
        match self {
            ParamMatcher::Exact(Type::Real) => *got == Type::Real || *got == Type::Integer,
            ParamMatcher::Exact(t) => t == got,
            ParamMatcher::Numeric => is_numeric(got),
            ParamMatcher::StringOrArray => *got == Type::String || got.is_array(),
        }
    }
}

pub struct BuiltinOverload {
    pub params: Vec<ParamMatcher>,
    pub ret: Type,
}

pub static BUILTIN_FUNCS: Lazy<std::collections::HashMap<&'static str, Vec<BuiltinOverload>>> =
    Lazy::new(|| {
        use ParamMatcher::*;
        let mut m = std::collections::HashMap::new();
        m.insert(
            "length",
            vec![BuiltinOverload {
                params: vec![StringOrArray],
                ret: Type::Integer,
            }],
        );
        m.insert(
            "concat",
            vec![BuiltinOverload {
                params: vec![Exact(Type::String), Exact(Type::String)],
                ret: Type::String,
            }],
        );
        m.insert(
            "ord",
            vec![BuiltinOverload {
                params: vec![Exact(Type::Char)],
                ret: Type::Integer,
            }],
        );
        m.insert(
            "chr",
            vec![BuiltinOverload {
                params: vec![Exact(Type::Integer)],
                ret: Type::Char,
            }],
        );
        m.insert(
            "odd",
            vec![BuiltinOverload {
                params: vec![Exact(Type::Integer)],
                ret: Type::Boolean,
            }],
        );
        m.insert(
            "abs",
            vec![
                BuiltinOverload {
                    params: vec![Exact(Type::Integer)],
                    ret: Type::Integer,
                },
                BuiltinOverload {
                    params: vec![Exact(Type::Real)],
                    ret: Type::Real,
                },
            ],
        );
        m.insert(
            "trunc",
            vec![BuiltinOverload {
                params: vec![Exact(Type::Real)],
                ret: Type::Integer,
            }],
        );
        m.insert(
            "round",
            vec![BuiltinOverload {
                params: vec![Exact(Type::Real)],
                ret: Type::Integer,
            }],
        );
        m
    });

pub fn is_builtin_name(name: &str) -> bool {
    BUILTIN_FUNCS.contains_key(name)
}

/// Resolves a built-in call by arity then by per-parameter matching,
/// returning the overload's return type on success.
pub fn resolve_builtin(name: &str, args: &[Type]) -> Option<Type> {
    let overloads = BUILTIN_FUNCS.get(name)?;
    for ov in overloads {
        if ov.params.len() != args.len() {
            continue;
        }
        if ov
            .params
            .iter()
            .zip(args.iter())
            .all(|(p, a)| p.matches(a))
        {
            return Some(ov.ret.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_compat_widens_int_to_real() {
        assert!(assign_compat(&Type::Real, &Type::Integer));
        assert!(!assign_compat(&Type::Integer, &Type::Real));
        assert!(assign_compat(&Type::Integer, &Type::Integer));
    }

    #[test]
    fn numeric_result_promotes_on_either_side() {
        assert_eq!(numeric_result(&Type::Integer, &Type::Real), Type::Real);
        assert_eq!(numeric_result(&Type::Real, &Type::Integer), Type::Real);
        assert_eq!(
            numeric_result(&Type::Integer, &Type::Integer),
            Type::Integer
        );
    }

    #[test]
    fn resolve_builtin_picks_overload_by_arity_and_type() {
        assert_eq!(
            resolve_builtin("abs", &[Type::Integer]),
            Some(Type::Integer)
        );
        assert_eq!(resolve_builtin("abs", &[Type::Real]), Some(Type::Real));
        assert_eq!(resolve_builtin("abs", &[Type::String]), None);
        assert_eq!(
            resolve_builtin(
                "length",
                &[Type::array(1, 3, Type::Integer)]
            ),
            Some(Type::Integer)
        );
    }

    #[test]
    fn display_formats_arrays_like_the_source_language() {
        let t = Type::array(1, 3, Type::Integer);
        assert_eq!(t.to_string(), "array[1..3] of integer");
    }
}
