//! Macro for string conversions of status-like enums
//!
//! Generates `as_str`, `Display` and a case-insensitive `FromStr` from a
//! single variant-to-string table.
//!
//! ```rust
//! use tokenlink_domain::impl_status_strings;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Phase {
//!     Pending,
//!     Done,
//! }
//!
//! impl_status_strings!(Phase {
//!     Pending => "pending",
//!     Done => "done",
//! });
//!
//! assert_eq!(Phase::Done.to_string(), "done");
//! assert_eq!("PENDING".parse::<Phase>().ok(), Some(Phase::Pending));
//! ```

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum.
///
/// Parsing failures return [`DomainError::InvalidInput`](crate::DomainError).
#[macro_export]
macro_rules! impl_status_strings {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $enum_name {
            /// Canonical lowercase name
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err($crate::DomainError::InvalidInput(format!(
                        "invalid {}: {}",
                        stringify!($enum_name),
                        s
                    ))),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::DomainError;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Red,
        Green,
    }

    impl_status_strings!(Light {
        Red => "red",
        Green => "green",
    });

    #[test]
    fn test_display_and_parse() {
        assert_eq!(Light::Red.to_string(), "red");
        assert_eq!(Light::from_str(" GREEN ").ok(), Some(Light::Green));
    }

    /// Expands next to the crate's single-parameter `Result` alias.
    mod with_result_alias {
        #[allow(unused_imports)]
        use crate::Result;

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub(super) enum Phase {
            Open,
        }

        impl_status_strings!(Phase {
            Open => "open",
        });
    }

    #[test]
    fn test_expands_beside_result_alias() {
        use with_result_alias::Phase;
        assert_eq!(Phase::from_str("open").ok(), Some(Phase::Open));
        assert_eq!(Phase::Open.as_str(), "open");
    }

    #[test]
    fn test_parse_error_names_enum() {
        let err = Light::from_str("blue").expect_err("unknown variant");
        assert_eq!(err, DomainError::InvalidInput("invalid Light: blue".to_string()));
    }
}
