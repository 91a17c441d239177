//! Scriptable [`Host`] for unit tests: records every dispatch, replies with
//! a configured value, and backs arrays/big integers with plain maps.

use std::collections::HashMap;

use crate::host::{Host, HostCall, HostException, HostRef, ObjectId};
use crate::interning::SymbolId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub receiver: HostRef,
    pub selector: SymbolId,
    pub args: Vec<HostRef>,
    pub block: Option<HostRef>,
    pub kw_splat: bool,
}

pub struct TestHost {
    pub calls: Vec<RecordedCall>,
    /// Returned from the next dispatches.
    pub reply: HostRef,
    /// When set, the next dispatch raises instead of replying.
    pub fail_next: Option<String>,
    pub arrays: HashMap<ObjectId, Vec<HostRef>>,
    pub bignums: HashMap<ObjectId, (i8, Vec<u64>)>,
    next_id: u64,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            reply: HostRef::Nil,
            fail_next: None,
            arrays: HashMap::new(),
            bignums: HashMap::new(),
            next_id: 1,
        }
    }

    /// Mint a fresh object identity, as if the host allocated something.
    pub fn alloc_object(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn last_call(&self) -> &RecordedCall {
        self.calls.last().expect("no call recorded")
    }
}

impl Host for TestHost {
    fn dispatch(&mut self, call: HostCall<'_>) -> Result<HostRef, HostException> {
        self.calls.push(RecordedCall {
            receiver: call.receiver,
            selector: call.selector,
            args: call.args.to_vec(),
            block: call.block,
            kw_splat: call.kw_splat,
        });
        if let Some(message) = self.fail_next.take() {
            return Err(HostException::new(message));
        }
        Ok(self.reply)
    }

    fn new_array(&mut self, elems: &[HostRef]) -> ObjectId {
        let id = self.alloc_object();
        self.arrays.insert(id, elems.to_vec());
        id
    }

    fn new_data_container(&mut self) -> ObjectId {
        self.alloc_object()
    }

    fn new_big_integer(&mut self, sign: i8, limbs: &[u64]) -> ObjectId {
        let id = self.alloc_object();
        self.bignums.insert(id, (sign, limbs.to_vec()));
        id
    }

    fn big_integer(&self, id: ObjectId) -> Option<(i8, Vec<u64>)> {
        self.bignums.get(&id).cloned()
    }
}
