//! Conversions between rdkafka messages and runtime records.

use atlas_core::record::{Record, RecordHeaders};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message as _, OwnedHeaders};

/// Copy a broker message into an owned [`Record`].
///
/// Headers without a value are kept with an empty value.
pub(crate) fn to_record(message: &BorrowedMessage<'_>) -> Record {
    let mut headers = RecordHeaders::new();
    if let Some(borrowed) = message.headers() {
        for header in borrowed.iter() {
            headers.append(header.key, header.value.unwrap_or_default());
        }
    }

    let record = Record::new(
        message.topic(),
        message.partition(),
        message.offset(),
        message.payload().unwrap_or_default(),
    )
    .with_headers(headers);

    match message.key() {
        Some(key) => record.with_key(key),
        None => record,
    }
}

/// Build rdkafka headers from outbound headers, preserving order.
pub(crate) fn to_owned_headers(headers: &RecordHeaders) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, (key, value)| {
            acc.insert(Header { key, value: Some(value) })
        })
}
