//! Snapshot page bodies.

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::EventRecord;
use serde::Deserialize;
use serde_json::Value;

/// The decoded body of a snapshot read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotPage {
    /// Records that passed validation, in server order.
    pub items: Vec<EventRecord>,
    /// Total matching records reported by the server, if paginated.
    pub total: Option<u64>,
    /// Number of items the server could not turn into records.
    pub rejected: usize,
}

/// Limit/offset page or bare array, as served by different endpoints.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBody {
    Page {
        items: Vec<Value>,
        #[serde(default)]
        total: Option<u64>,
    },
    List(Vec<Value>),
}

impl SnapshotPage {
    /// Decodes a snapshot body.
    ///
    /// The body must be JSON and either `{ "items": [...] }` or a bare array.
    /// Individual items that are not valid records are counted in
    /// [`SnapshotPage::rejected`] instead of failing the whole page.
    pub fn from_json(body: &[u8]) -> ProtocolResult<Self> {
        let raw: RawBody = serde_json::from_slice(body).map_err(|err| {
            if err.is_data() {
                ProtocolError::MalformedRecord(format!("unexpected snapshot body: {err}"))
            } else {
                ProtocolError::InvalidJson(err)
            }
        })?;
        let (values, total) = match raw {
            RawBody::Page { items, total } => (items, total),
            RawBody::List(items) => (items, None),
        };

        let mut page = SnapshotPage {
            items: Vec::with_capacity(values.len()),
            total,
            rejected: 0,
        };
        for value in values {
            match EventRecord::try_from(value) {
                Ok(record) => page.items.push(record),
                Err(_) => page.rejected += 1,
            }
        }
        Ok(page)
    }
}
