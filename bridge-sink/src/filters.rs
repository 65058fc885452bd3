//! Validation of the AMQP source filter set a sink link's attach may carry.
//!
//! Filter values arrive off the wire as opaque, dynamically-typed AMQP data
//! (an `int`, a `long`, a string, whatever the peer happened to encode); the
//! bridge does no coercion between these shapes, only rejects ones it does
//! not recognize for the filter in question.

use bridge_core::error::AmqpErrorSymbol;

/// An untyped filter value as it arrives off the wire, before this module
/// narrows it to the specific AMQP type each named filter requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterValue {
    /// An AMQP `int` (32-bit signed).
    Int(i32),
    /// An AMQP `long` (64-bit signed).
    Long(i64),
    /// Any other wire type the bridge does not narrow, always a validation
    /// error wherever it appears.
    Other,
}

/// The two named filters, once validated and narrowed to their expected
/// types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsedFilters {
    /// The `partition` filter, if the peer supplied one.
    pub partition: Option<i32>,
    /// The `offset` filter, if the peer supplied one.
    pub offset: Option<i64>,
}

/// Validate a sink link's `partition`/`offset` source filters.
///
/// Checks run in the order the external contract fixes: a malformed
/// `partition` is reported before a malformed `offset`, which is reported
/// before the cross-filter `offset`-without-`partition` rule, which is
/// reported before the range checks on whichever filters parsed.
///
/// # Errors
///
/// Returns the first applicable [`AmqpErrorSymbol`] from the table: a
/// non-integer `partition`, a non-long `offset`, an `offset` filter without
/// an accompanying `partition`, or either filter being negative.
pub fn validate(
    partition: Option<FilterValue>,
    offset: Option<FilterValue>,
) -> Result<ParsedFilters, AmqpErrorSymbol> {
    let partition = match partition {
        None => None,
        Some(FilterValue::Int(value)) => Some(value),
        Some(_) => return Err(AmqpErrorSymbol::WrongPartitionFilter),
    };
    let offset = match offset {
        None => None,
        Some(FilterValue::Long(value)) => Some(value),
        Some(_) => return Err(AmqpErrorSymbol::WrongOffsetFilter),
    };
    if offset.is_some() && partition.is_none() {
        return Err(AmqpErrorSymbol::NoPartitionFilter);
    }
    if partition.is_some_and(|p| p < 0) || offset.is_some_and(|o| o < 0) {
        return Err(AmqpErrorSymbol::WrongFilter);
    }
    Ok(ParsedFilters { partition, offset })
}
