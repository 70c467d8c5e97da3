use log::trace;

use wraith_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::strings::net_string::NetStringHandle;

pub const ENTRY_COUNT: usize = 32;
pub const ENTRY_BIT_SIZE: u8 = 5;

const LRU_HEAD: usize = ENTRY_COUNT;
const LRU_TAIL: usize = ENTRY_COUNT + 1;

#[derive(Default)]
struct Entry {
    string: Option<NetStringHandle>,
    receive_confirmed: bool,
    hash_next: Option<usize>,
}

/// Per-connection string interning.
///
/// The send side is a fixed set of slots that double as a hash table (one
/// chain per bucket) and an LRU list (index links with head and tail
/// sentinels). A miss always recycles the least recently used slot and
/// queues a mapping announcement for the remote side.
///
/// The receive side is a plain index -> string array filled by the remote's
/// announcements. The two sides are never unified.
pub struct ConnectionStringTable {
    entries: Vec<Entry>,
    prev: [usize; ENTRY_COUNT + 2],
    next: [usize; ENTRY_COUNT + 2],
    buckets: [Option<usize>; ENTRY_COUNT],
    remote_strings: Vec<Option<NetStringHandle>>,
    pending_announcements: Vec<(u8, NetStringHandle)>,
}

impl ConnectionStringTable {
    pub fn new() -> Self {
        let mut prev = [0; ENTRY_COUNT + 2];
        let mut next = [0; ENTRY_COUNT + 2];

        // head -> 0 -> 1 -> .. -> 31 -> tail
        let mut last = LRU_HEAD;
        for index in 0..ENTRY_COUNT {
            next[last] = index;
            prev[index] = last;
            last = index;
        }
        next[last] = LRU_TAIL;
        prev[LRU_TAIL] = last;
        prev[LRU_HEAD] = LRU_HEAD;
        next[LRU_TAIL] = LRU_TAIL;

        Self {
            entries: (0..ENTRY_COUNT).map(|_| Entry::default()).collect(),
            prev,
            next,
            buckets: [None; ENTRY_COUNT],
            remote_strings: vec![None; ENTRY_COUNT],
            pending_announcements: Vec::new(),
        }
    }

    // Send side

    /// Returns the slot holding `string` and whether the remote side has
    /// confirmed the mapping, interning the string if necessary.
    pub fn check_string(&mut self, string: &NetStringHandle) -> (u8, bool) {
        if let Some(index) = self.find(string) {
            self.promote(index);
            return (index as u8, self.entries[index].receive_confirmed);
        }

        let index = self.next[LRU_HEAD];
        self.promote(index);

        if let Some(old_string) = self.entries[index].string.take() {
            self.unlink_bucket(index, bucket_of(&old_string));
            trace!("string table evicting {:?} from slot {}", old_string, index);
        }

        let bucket = bucket_of(string);
        let entry = &mut self.entries[index];
        entry.string = Some(string.clone());
        entry.receive_confirmed = false;
        entry.hash_next = self.buckets[bucket];
        self.buckets[bucket] = Some(index);

        self.pending_announcements
            .push((index as u8, string.clone()));

        (index as u8, false)
    }

    /// Slot of an already interned string.
    pub fn net_send_id(&self, string: &NetStringHandle) -> Option<u8> {
        let found = self.find(string);
        debug_assert!(found.is_some(), "net_send_id called for {:?}, which is not interned", string);
        found.map(|index| index as u8)
    }

    /// Whether `string` is interned and its mapping reached the remote side.
    pub fn is_confirmed(&self, string: &NetStringHandle) -> bool {
        self.find(string)
            .is_some_and(|index| self.entries[index].receive_confirmed)
    }

    /// Called when the announcement binding `index` to `string` was
    /// acknowledged. Ignored if the slot has since been recycled.
    pub fn confirm_string_received(&mut self, string: &NetStringHandle, index: u8) {
        if self.is_current(index, string) {
            self.entries[usize::from(index)].receive_confirmed = true;
        }
    }

    /// Whether `index` still holds `string` on the send side.
    pub fn is_current(&self, index: u8, string: &NetStringHandle) -> bool {
        self.entries
            .get(usize::from(index))
            .and_then(|entry| entry.string.as_ref())
            == Some(string)
    }

    pub fn sent_string(&self, index: u8) -> Option<&NetStringHandle> {
        self.entries
            .get(usize::from(index))
            .and_then(|entry| entry.string.as_ref())
    }

    /// Slot that the next miss would recycle.
    pub fn least_recently_used(&self) -> u8 {
        self.next[LRU_HEAD] as u8
    }

    /// Announcements created since the last call, oldest first.
    pub fn take_announcements(&mut self) -> Vec<(u8, NetStringHandle)> {
        std::mem::take(&mut self.pending_announcements)
    }

    fn find(&self, string: &NetStringHandle) -> Option<usize> {
        let mut walk = self.buckets[bucket_of(string)];
        while let Some(index) = walk {
            let entry = &self.entries[index];
            if entry.string.as_ref() == Some(string) {
                return Some(index);
            }
            walk = entry.hash_next;
        }
        None
    }

    /// Moves a slot to the most recently used end of the list
    fn promote(&mut self, index: usize) {
        let (before, after) = (self.prev[index], self.next[index]);
        self.next[before] = after;
        self.prev[after] = before;

        let last = self.prev[LRU_TAIL];
        self.next[last] = index;
        self.prev[index] = last;
        self.next[index] = LRU_TAIL;
        self.prev[LRU_TAIL] = index;
    }

    fn unlink_bucket(&mut self, index: usize, bucket: usize) {
        let following = self.entries[index].hash_next.take();
        if self.buckets[bucket] == Some(index) {
            self.buckets[bucket] = following;
            return;
        }
        let mut walk = self.buckets[bucket];
        while let Some(current) = walk {
            if self.entries[current].hash_next == Some(index) {
                self.entries[current].hash_next = following;
                return;
            }
            walk = self.entries[current].hash_next;
        }
        debug_assert!(false, "string table slot {} missing from its bucket", index);
    }

    // Receive side

    pub fn map_string(&mut self, remote_index: u8, string: NetStringHandle) {
        if let Some(slot) = self.remote_strings.get_mut(usize::from(remote_index)) {
            *slot = Some(string);
        }
    }

    pub fn lookup_string(&self, remote_index: u8) -> Option<&NetStringHandle> {
        self.remote_strings
            .get(usize::from(remote_index))
            .and_then(|slot| slot.as_ref())
    }

    // Demo

    pub fn write_start_block(&self, writer: &mut dyn BitWrite) {
        for slot in &self.remote_strings {
            match slot {
                Some(string) => {
                    true.ser(writer);
                    string.as_str().to_string().ser(writer);
                }
                None => false.ser(writer),
            }
        }
    }

    pub fn read_start_block(&mut self, reader: &mut BitReader) -> Result<(), SerdeErr> {
        for slot in self.remote_strings.iter_mut() {
            *slot = if bool::de(reader)? {
                Some(NetStringHandle::from(String::de(reader)?))
            } else {
                None
            };
        }
        Ok(())
    }
}

impl Default for ConnectionStringTable {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_of(string: &NetStringHandle) -> usize {
    (string.table_hash() % ENTRY_COUNT as u64) as usize
}
