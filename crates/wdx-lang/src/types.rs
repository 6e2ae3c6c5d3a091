//! WDL types and the lifting rules applied at block boundaries.
//!
//! A value observed from outside a scatter block has its type lifted to
//! `Array[T]`; a value observed from outside a conditional block is lifted
//! to `T?`. Lifting to optional is idempotent: `T?` stays `T?`, never
//! `T??`.

use std::fmt;

use serde::Serialize;

/// A WDL type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Type {
    Boolean,
    Int,
    Float,
    String,
    File,
    /// `Array[T]`
    Array(Box<Type>),
    /// `T?`
    Optional(Box<Type>),
    /// `Map[K, V]`
    Map(Box<Type>, Box<Type>),
    /// `Pair[L, R]`
    Pair(Box<Type>, Box<Type>),
}

impl Type {
    /// The type of this value when observed from outside a scatter block.
    pub fn lifted_array(&self) -> Type {
        Type::Array(Box::new(self.clone()))
    }

    /// The type of this value when observed from outside a conditional
    /// block. Already-optional types are left unchanged.
    pub fn lifted_optional(&self) -> Type {
        if self.is_optional() {
            self.clone()
        } else {
            Type::Optional(Box::new(self.clone()))
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Type::Optional(_))
    }

    /// Strips one level of optionality, if present.
    pub fn unwrap_optional(&self) -> &Type {
        match self {
            Type::Optional(inner) => inner,
            other => other,
        }
    }

    /// Whether a value of this type is representable at the platform
    /// boundary without a collect step: primitives and files, arrays of
    /// those, and optionals of any native type.
    pub fn is_native(&self) -> bool {
        match self {
            Type::Boolean | Type::Int | Type::Float | Type::String | Type::File => true,
            Type::Array(inner) => matches!(
                inner.as_ref(),
                Type::Boolean | Type::Int | Type::Float | Type::String | Type::File
            ),
            Type::Optional(inner) => inner.is_native(),
            Type::Map(..) | Type::Pair(..) => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "Boolean"),
            Type::Int => write!(f, "Int"),
            Type::Float => write!(f, "Float"),
            Type::String => write!(f, "String"),
            Type::File => write!(f, "File"),
            Type::Array(inner) => write!(f, "Array[{}]", inner),
            Type::Optional(inner) => write!(f, "{}?", inner),
            Type::Map(key, value) => write!(f, "Map[{}, {}]", key, value),
            Type::Pair(left, right) => write!(f, "Pair[{}, {}]", left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_lifting_wraps_any_type() {
        assert_eq!(Type::Int.lifted_array(), Type::Array(Box::new(Type::Int)));
        assert_eq!(
            Type::Array(Box::new(Type::File)).lifted_array(),
            Type::Array(Box::new(Type::Array(Box::new(Type::File))))
        );
    }

    #[test]
    fn optional_lifting_is_idempotent() {
        let opt_int = Type::Optional(Box::new(Type::Int));
        assert_eq!(Type::Int.lifted_optional(), opt_int);
        assert_eq!(opt_int.lifted_optional(), opt_int);
    }

    #[test]
    fn nativeness_at_platform_boundary() {
        assert!(Type::Int.is_native());
        assert!(Type::Array(Box::new(Type::File)).is_native());
        assert!(Type::Optional(Box::new(Type::Int)).is_native());
        assert!(!Type::Array(Box::new(Type::Array(Box::new(Type::Int)))).is_native());
        assert!(!Type::Map(Box::new(Type::String), Box::new(Type::File)).is_native());
        assert!(!Type::Pair(Box::new(Type::Int), Box::new(Type::Int)).is_native());
    }

    #[test]
    fn display_matches_source_syntax() {
        assert_eq!(Type::Array(Box::new(Type::Int)).to_string(), "Array[Int]");
        assert_eq!(Type::Optional(Box::new(Type::File)).to_string(), "File?");
        assert_eq!(
            Type::Map(Box::new(Type::String), Box::new(Type::Int)).to_string(),
            "Map[String, Int]"
        );
    }
}
