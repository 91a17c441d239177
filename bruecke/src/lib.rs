mod bridge;
mod error;
mod gvl;
mod host;
mod interning;
mod intpack;
mod roots;
mod scan;
mod table;
#[cfg(test)]
mod testhost;
mod typed;
mod value;

pub use bridge::Bridge;
pub use error::BridgeError;
pub use gvl::{RuntimeLock, ThreadToken, UnblockFn, current_thread_token};
pub use host::{Host, HostCall, HostException, HostRef, ObjectId};
pub use interning::{SymbolId, Symbols};
pub use intpack::{
    BigInt, MAX_WORDSIZE, PACK_2COMP, PACK_LSBYTE_FIRST, PACK_LSWORD_FIRST,
    PACK_MSBYTE_FIRST, PACK_MSWORD_FIRST, PACK_NATIVE_BYTE_ORDER, pack, unpack,
};
pub use roots::RootRegistry;
pub use scan::{ArgFormat, KwIndication};
pub use table::{BLOCK_SLOTS, HandleTable};
pub use typed::{
    DataTypeDesc, FreeFn, FreePolicy, MarkFn, SizeFn, TypedDataRegistry, bridge_free,
    bridge_malloc,
};
pub use value::Handle;
