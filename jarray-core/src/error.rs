//! Stable error codes for the library's error enums.
//!
//! Log consumers match on machine-readable codes rather than parsing
//! display text. Each error enum gets a typed code enum generated next to
//! it, so adding an error variant without a code fails to compile.

macro_rules! define_error_codes {
    (
        $(#[$enum_meta:meta])*
        enum $CodeTy:ident for $ErrTy:ident {
            $(
                $(#[$variant_meta:meta])*
                $CodeVariant:ident => $ErrVariant:ident $( { $($pattern:tt)* } )? => $code:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[non_exhaustive]
        pub enum $CodeTy {
            $(
                $(#[$variant_meta])*
                $CodeVariant,
            )+
        }

        impl $CodeTy {
            /// The stable machine-readable representation of this code.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$CodeVariant => $code,)+
                }
            }
        }

        impl ::std::fmt::Display for $CodeTy {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $ErrTy {
            #[doc = concat!(
                "The stable [`",
                stringify!($CodeTy),
                "`] for this error."
            )]
            #[must_use]
            pub const fn code(&self) -> $CodeTy {
                match self {
                    $(Self::$ErrVariant $( { $($pattern)* } )? => $CodeTy::$CodeVariant,)+
                }
            }
        }
    };
}

pub(crate) use define_error_codes;

#[cfg(test)]
mod tests {
    use crate::{RangeError, RangeErrorCode, SchedulerError, StatusError};

    #[test]
    fn codes_render_their_stable_strings() {
        let err = RangeError::MalformedToken {
            token: "x".to_owned(),
            spec: "[1,x]".to_owned(),
        };
        assert_eq!(err.code(), RangeErrorCode::MalformedToken);
        assert_eq!(err.code().as_str(), "RANGE_MALFORMED_TOKEN");
        assert_eq!(err.code().to_string(), "RANGE_MALFORMED_TOKEN");
    }

    #[test]
    fn nested_scheduler_failures_keep_their_own_code() {
        let inner = SchedulerError::Failed {
            command: "sacct -o JobName,JobID,State -nXPj 9".to_owned(),
            status: 1,
        };
        let err = StatusError::from(inner);
        assert_eq!(err.code().as_str(), "ACCOUNTING_QUERY_FAILED");
    }
}
