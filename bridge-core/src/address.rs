//! AMQP link address parsing.
//!
//! A sink link's remote source address encodes both the Kafka topic and the
//! consumer group id it should subscribe under, joined by the literal
//! separator `/group.id/`.

use crate::error::AmqpErrorSymbol;

const SEPARATOR: &str = "/group.id/";

/// A parsed sink link address: `<topic>/group.id/<consumer-group-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkAddress {
    /// The Kafka topic to subscribe to.
    pub topic: String,
    /// The consumer group id to subscribe under.
    pub group_id: String,
}

impl LinkAddress {
    /// Parse a remote source address into a topic and consumer group id.
    ///
    /// # Errors
    ///
    /// Returns [`AmqpErrorSymbol::NoGroupId`] if the address does not contain
    /// the literal substring `/group.id/`, and [`AmqpErrorSymbol::WrongFilter`]
    /// if either half is empty.
    pub fn parse(address: &str) -> Result<Self, AmqpErrorSymbol> {
        let Some(idx) = address.find(SEPARATOR) else {
            return Err(AmqpErrorSymbol::NoGroupId);
        };

        let topic = &address[..idx];
        let group_id = &address[idx + SEPARATOR.len()..];

        if topic.is_empty() || group_id.is_empty() {
            return Err(AmqpErrorSymbol::WrongFilter);
        }

        Ok(Self {
            topic: topic.to_string(),
            group_id: group_id.to_string(),
        })
    }

    /// Format a `(topic, group_id)` pair back into a link address.
    #[must_use]
    pub fn format(topic: &str, group_id: &str) -> String {
        format!("{topic}{SEPARATOR}{group_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_topic_and_group() {
        let addr = LinkAddress::parse("orders/group.id/g1").unwrap();
        assert_eq!(addr.topic, "orders");
        assert_eq!(addr.group_id, "g1");
    }

    #[test]
    fn missing_separator_is_no_groupid() {
        let err = LinkAddress::parse("orders").unwrap_err();
        assert_eq!(err, AmqpErrorSymbol::NoGroupId);
    }

    #[test]
    fn empty_topic_is_wrong_filter() {
        let err = LinkAddress::parse("/group.id/g1").unwrap_err();
        assert_eq!(err, AmqpErrorSymbol::WrongFilter);
    }

    #[test]
    fn empty_group_is_wrong_filter() {
        let err = LinkAddress::parse("orders/group.id/").unwrap_err();
        assert_eq!(err, AmqpErrorSymbol::WrongFilter);
    }

    #[test]
    fn first_occurrence_of_separator_wins() {
        // A group id that itself contains the separator is not special-cased;
        // the topic is everything before the first occurrence.
        let addr = LinkAddress::parse("orders/group.id/g1/group.id/g2").unwrap();
        assert_eq!(addr.topic, "orders");
        assert_eq!(addr.group_id, "g1/group.id/g2");
    }

    fn arb_component() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9._-]{1,16}".prop_filter("must not contain separator", |s| {
            !s.contains(SEPARATOR)
        })
    }

    proptest! {
        #[test]
        fn round_trip(topic in arb_component(), group in arb_component()) {
            let formatted = LinkAddress::format(&topic, &group);
            let parsed = LinkAddress::parse(&formatted).unwrap();
            prop_assert_eq!(parsed.topic, topic);
            prop_assert_eq!(parsed.group_id, group);
        }
    }
}
