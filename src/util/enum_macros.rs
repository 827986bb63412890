/// Generates a BACnet enumeration that round-trips through both its numeric
/// wire value and the camelCase label the protocol engine uses when it renders
/// a packet as text (`"device"`, `"objectName"`, ...).
///
/// Values without a named variant are kept as `Other(value)` so a proprietary
/// object type or a property from a newer protocol revision never fails a
/// conversion.
///
/// # Arguments
///
/// * `$name:ident` - The name of the enum to be generated.
/// * `$variant:ident = $value:literal => $label:literal` - Named variants with
///   their numeric value and text label.
/// * `$unit:ident` - The underlying integer type for the enum (e.g. `u16`, `u32`).
///
/// # Example
///
/// ```rust
/// use bacnet_poller::bacnet_enum;
///
/// bacnet_enum! {
///     Fruit {
///         Apple = 1 => "apple",
///         Pear = 2 => "pear",
///     },
///     u16
/// }
///
/// assert_eq!(u16::from(Fruit::Pear), 2);
/// assert_eq!(Fruit::from(1u16), Fruit::Apple);
/// assert_eq!(Fruit::from(7u16), Fruit::Other(7));
/// assert_eq!("pear".parse::<Fruit>().unwrap(), Fruit::Pear);
/// assert_eq!("7".parse::<Fruit>().unwrap(), Fruit::Other(7));
/// assert_eq!(Fruit::Apple.to_string(), "apple");
/// assert!("banana".parse::<Fruit>().is_err());
/// ```
///
/// # Generated Code Structure
///
/// * The enum itself, deriving `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`,
///   `Hash`, `PartialOrd` and `Ord`.
/// * `Parse<Name>Error`, returned by `FromStr` for unknown labels.
/// * `From<$name> for $unit` and `From<$unit> for $name`.
/// * `Display` writing the label, or the bare number for `Other`.
/// * `FromStr` accepting a label or a decimal number.
#[macro_export]
macro_rules! bacnet_enum {
    ($(#[$doc:meta])* $name:ident { $($variant:ident = $value:literal => $label:literal,)+ }, $unit:ident) => {
        $crate::pastey::paste! {
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub enum $name {
                $($variant,)*
                Other($unit),
            }

            #[derive(Debug, Clone, PartialEq, Eq)]
            pub struct [<Parse $name Error>](pub String);

            impl std::fmt::Display for [<Parse $name Error>] {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "unknown {} '{}'", stringify!($name), self.0)
                }
            }

            impl std::error::Error for [<Parse $name Error>] {}

            impl $name {
                /// Text label, if this is a named variant
                pub fn label(&self) -> Option<&'static str> {
                    match self {
                        $($name::$variant => Some($label),)*
                        $name::Other(_) => None,
                    }
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    match self {
                        $($name::$variant => f.write_str($label),)*
                        $name::Other(value) => write!(f, "{}", value),
                    }
                }
            }

            impl From<$name> for $unit {
                fn from(value: $name) -> Self {
                    match value {
                        $($name::$variant => $value,)*
                        $name::Other(value) => value,
                    }
                }
            }

            impl From<$unit> for $name {
                fn from(value: $unit) -> Self {
                    match value {
                        $($value => $name::$variant,)*
                        other => $name::Other(other),
                    }
                }
            }

            impl std::str::FromStr for $name {
                type Err = [<Parse $name Error>];

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    match s {
                        $($label => Ok($name::$variant),)*
                        other => other
                            .parse::<$unit>()
                            .map($name::from)
                            .map_err(|_| [<Parse $name Error>](other.to_string())),
                    }
                }
            }
        }
    };
}
