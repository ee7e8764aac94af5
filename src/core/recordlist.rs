//! Ordered record ids produced by one store

use crate::core::archive::{
    load_len, store_sequence_len, Archivable, InputArchive, OutputArchive, Sequence,
};
use crate::core::container::RecordId;
use crate::core::error::Result;
use crate::core::registry::RECORDLIST_COOKIE;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Record ids of one (possibly composite) value, consumed front to back
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recordlist {
    ids: VecDeque<RecordId>,
}

impl Recordlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: RecordId) {
        self.ids.push_back(id);
    }

    /// Append all of `other`, keeping order
    pub fn append(&mut self, mut other: Recordlist) {
        self.ids.append(&mut other.ids);
    }

    pub fn pop_front(&mut self) -> Option<RecordId> {
        self.ids.pop_front()
    }

    pub fn front(&self) -> Option<RecordId> {
        self.ids.front().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.ids.iter().copied()
    }
}

impl From<RecordId> for Recordlist {
    fn from(id: RecordId) -> Self {
        let mut list = Recordlist::new();
        list.push(id);
        list
    }
}

impl FromIterator<RecordId> for Recordlist {
    fn from_iter<I: IntoIterator<Item = RecordId>>(iter: I) -> Self {
        Recordlist {
            ids: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Recordlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "]")
    }
}

impl Sequence for Recordlist {
    fn element_count(&self) -> usize {
        self.ids.len()
    }
}

/// Recordlists travel between worlds, so they are archivable themselves
impl Archivable for Recordlist {
    const COOKIE: u8 = RECORDLIST_COOKIE;

    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        let raw: Vec<u64> = self.ids.iter().map(|id| id.0).collect();
        store_sequence_len(ar, self)?;
        u64::store_array(&raw, ar)
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let len = load_len(ar)?;
        let mut raw = vec![0u64; len];
        u64::load_array(&mut raw, ar)?;
        self.ids = raw.into_iter().map(RecordId).collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::{from_bytes, to_bytes};

    #[test]
    fn test_order_and_append() {
        let mut a: Recordlist = [RecordId(1), RecordId(2)].into_iter().collect();
        a.append(Recordlist::from(RecordId(3)));

        assert_eq!(a.len(), 3);
        assert_eq!(a.pop_front(), Some(RecordId(1)));
        assert_eq!(a.front(), Some(RecordId(2)));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![RecordId(2), RecordId(3)]);
    }

    #[test]
    fn test_display() {
        let list: Recordlist = [RecordId(1), RecordId(255)].into_iter().collect();
        assert_eq!(list.to_string(), "[0000000000000001, 00000000000000ff]");
    }

    #[test]
    fn test_archive_and_json() {
        let list: Recordlist = (1..=4).map(RecordId).collect();
        let bytes = to_bytes(&list).unwrap();
        assert_eq!(bytes[0], RECORDLIST_COOKIE);
        assert_eq!(from_bytes::<Recordlist>(&bytes).unwrap(), list);

        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        assert_eq!(serde_json::from_str::<Recordlist>(&json).unwrap(), list);
    }
}
