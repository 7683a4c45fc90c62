/// Generates a one-byte ECHONET Lite code enum with named variants, a
/// `Custom` variant for unnamed codes inside a given range and a `Reserved`
/// variant for everything else.
///
/// ECHONET Lite reserves blocks of its code spaces: service codes live in
/// `0x50..=0x7F`, and property codes `0xF0..=0xFF` are left to manufacturers.
/// The range argument lets an enum keep those values distinguishable from
/// codes that are simply invalid.
///
/// # Arguments
///
/// * `$name:ident` - The name of the enum to be generated.
/// * `$variant:ident = $value:expr` - A comma-separated list of named enum
///   variants and their corresponding integer values.
/// * `$unit:ident` - The underlying integer type for the enum (`u8` for all
///   ECHONET Lite codes).
/// * `$range:expr` - The range whose unnamed values become `Custom`.
///
/// # Example
///
/// ```rust
/// use echonet_rs::generate_custom_enum;
///
/// generate_custom_enum! {
///     MyCode {
///         First = 0x80,
///         Second = 0x81,
///     },
///     u8,
///     0xF0..=0xFF
/// }
///
/// let named = MyCode::from(0x81u8);
/// let custom = MyCode::from(0xF3u8);
/// let reserved = MyCode::from(0x10u8);
///
/// assert_eq!(named, MyCode::Second);
/// assert_eq!(u8::from(MyCode::First), 0x80);
/// assert_eq!(format!("{}", MyCode::First), "First");
/// if let MyCode::Custom(value) = custom {
///     assert_eq!(value.value(), 0xF3);
/// } else {
///     panic!("Expected MyCode::Custom");
/// }
/// if let MyCode::Reserved(value) = reserved {
///     assert_eq!(value.value(), 0x10);
/// } else {
///     panic!("Expected MyCode::Reserved");
/// }
/// ```
///
/// # Generated Code Structure
///
/// * The named variants provided by the caller.
/// * `Custom(<Name>Value)` for unnamed values inside the range.
/// * `Reserved(<Name>Value)` for values outside the range.
///
/// It also implements `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`,
/// `Display` (variant name, `Custom(n)` or `Reserved(n)`) and lossless
/// `From` conversions in both directions.
#[macro_export]
macro_rules! generate_custom_enum {
    ($(#[$doc:meta])* $name:ident { $($variant:ident = $value:expr,)+ }, $unit:ident, $custom_range:expr) => {
        pastey::paste! {
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum $name {
                $($variant,)*
                Custom( [<$name Value>] ),
                Reserved( [<$name Value>] ),
            }

            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct [<$name Value>] { value: $unit }

            impl [<$name Value>] {
                fn new(value: $unit) -> Self {
                    Self { value }
                }

                pub fn value(&self) -> $unit {
                    self.value
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    match self {
                        $($name::$variant => write!(f, "{}", stringify!($variant)),)*
                        $name::Custom( value ) => write!(f, "Custom(0x{:02X})", value.value()),
                        $name::Reserved( value ) => write!(f, "Reserved(0x{:02X})", value.value()),
                    }
                }
            }

            impl From<$name> for $unit {
                fn from(value: $name) -> Self {
                    match value {
                        $($name::$variant => $value,)*
                        $name::Custom( value ) => value.value(),
                        $name::Reserved( value ) => value.value(),
                    }
                }
            }

            impl From<$unit> for $name {
                fn from(value: $unit) -> Self {
                    match value {
                        $($value => $name::$variant,)*
                        v if ($custom_range).contains(&v) => {
                            $name::Custom( [<$name Value>]::new(v) )
                        }
                        v => $name::Reserved( [<$name Value>]::new(v) ),
                    }
                }
            }
        }
    };
}
