//! Declarative helpers shared by the schema modules

/// Define a string-valued status enum.
///
/// Each variant serializes to its lowercase literal and also accepts the
/// listed aliases on input, so older documents written as `"Draft"` still
/// load. The generated type gets `as_str`, `Display`, `FromStr` and a
/// `Bson` conversion for use inside `doc!` filters.
macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $text:literal $(| $alias:literal)*
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text $(, alias = $alias)*)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::types::IbError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text $(| $alias)* => Ok(Self::$variant),)+
                    other => Err($crate::types::IbError::BadRequest(format!(
                        "Unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl From<$name> for bson::Bson {
            fn from(value: $name) -> Self {
                bson::Bson::String(value.as_str().to_string())
            }
        }
    };
}

/// Implement `Record` and `MutMetadata` for a schema with `id` and
/// `metadata` fields.
macro_rules! impl_record {
    ($ty:ty, $collection:expr, $kind:literal) => {
        impl $crate::db::mongo::MutMetadata for $ty {
            fn mut_metadata(&mut self) -> &mut $crate::db::schemas::Metadata {
                &mut self.metadata
            }
        }

        impl $crate::db::repository::Record for $ty {
            const COLLECTION: &'static str = $collection;
            const KIND: &'static str = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn metadata(&self) -> &$crate::db::schemas::Metadata {
                &self.metadata
            }
        }
    };
}
