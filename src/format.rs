//! Rendering preferences for trace and failure messages.

use strum::{Display, EnumString};

/// How a bits-typed value is rendered when interpolated into a trace or
/// failure message.
///
/// `Default` renders unsigned values as unsigned decimal and signed values
/// as signed decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FormatPreference {
    Default,
    Binary,
    SignedDecimal,
    UnsignedDecimal,
    Hex,
}
