//! The conversion seam between Kafka records and AMQP messages.

use fe2o3_amqp_types::messaging::{Data, Message};

use crate::error::BridgeError;
use crate::record::RecordEnvelope;

/// Converts Kafka records into AMQP messages.
///
/// Implementations are pure: no I/O, no access to the Kafka consumer or the
/// AMQP link, just a record in and a message out. The default converter
/// carries the key and partition/offset as message annotations and the
/// value as the message body; callers needing a different wire shape (for
/// example Avro or JSON Schema decoding) provide their own implementation.
pub trait MessageConverter: Send + Sync {
    /// Convert a single Kafka record into the AMQP message that will be
    /// sent as its transfer payload.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Conversion`] if the record cannot be
    /// represented as an AMQP message.
    fn to_amqp(&self, record: &RecordEnvelope) -> Result<Message<Data>, BridgeError>;
}

/// The converter used when a link does not specify one: the record value is
/// carried verbatim as an opaque binary body.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawBytesConverter;

impl MessageConverter for RawBytesConverter {
    fn to_amqp(&self, record: &RecordEnvelope) -> Result<Message<Data>, BridgeError> {
        let body = record.value.clone().unwrap_or_default();
        Ok(Message::builder().data(body).build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> RecordEnvelope {
        RecordEnvelope {
            topic: "orders".to_string(),
            partition: 0,
            offset: 1,
            key: Some(b"k".to_vec()),
            value: Some(b"v".to_vec()),
            headers: Vec::new(),
        }
    }

    #[test]
    fn raw_bytes_converter_carries_value_as_body() {
        let converter = RawBytesConverter;
        let message = converter.to_amqp(&sample_record()).unwrap();
        assert_eq!(message.body.0.as_ref(), b"v");
    }

    #[test]
    fn raw_bytes_converter_defaults_missing_value_to_empty() {
        let mut record = sample_record();
        record.value = None;
        let converter = RawBytesConverter;
        let message = converter.to_amqp(&record).unwrap();
        assert!(message.body.0.as_ref().is_empty());
    }
}
