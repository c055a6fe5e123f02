//! Lightweight representation of a resolved Rust type.
//!
//! The analyzer has no type checker; this is the shape inference trades in:
//! a fully-qualified path plus resolved generic arguments. Primitives keep
//! their bare name as the path.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RustType {
    /// Fully-qualified path (`server::views::Goods`, `tide::Request`,
    /// `Vec`, `i64`).
    pub path: String,
    /// Resolved generic arguments.
    pub args: Vec<RustType>,
}

impl RustType {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(path: impl Into<String>, args: Vec<RustType>) -> Self {
        Self {
            path: path.into(),
            args,
        }
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit("::").next().unwrap_or(&self.path)
    }

    /// Module prefix of the path, empty for bare names.
    pub fn module(&self) -> &str {
        match self.path.rfind("::") {
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }

    pub fn is(&self, path: &str) -> bool {
        self.path == path
    }

    /// Strips one `Option`/`Result` wrapper, yielding the payload type.
    pub fn unwrap_payload(&self) -> Option<&RustType> {
        if (self.name() == "Option" || self.name() == "Result") && !self.args.is_empty() {
            Some(&self.args[0])
        } else {
            None
        }
    }
}

impl fmt::Display for RustType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_module() {
        let ty = RustType::new("server::views::Goods");
        assert_eq!(ty.name(), "Goods");
        assert_eq!(ty.module(), "server::views");
        assert_eq!(RustType::new("i64").module(), "");
    }

    #[test]
    fn test_unwrap_payload() {
        let ty = RustType::with_args("Result", vec![RustType::new("String")]);
        assert_eq!(ty.unwrap_payload().unwrap().path, "String");
        assert!(RustType::new("String").unwrap_payload().is_none());
    }

    #[test]
    fn test_display() {
        let ty = RustType::with_args(
            "server::views::Page",
            vec![RustType::new("server::views::Goods")],
        );
        assert_eq!(ty.to_string(), "server::views::Page<server::views::Goods>");
    }
}
