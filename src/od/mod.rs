//! Object Dictionary engine (component per spec §4.1), grounded in
//! `original_source/301/CO_ODinterface.{h,c}`.

pub mod attributes;
pub mod dictionary;
pub mod entry;
pub mod extension;
pub mod index;
pub mod result;
pub mod stream;
pub mod table;

pub use attributes::OdAttributes;
pub use dictionary::{sub_count_entry, ObjectDictionary, OdReadOutcome};
pub use entry::{OdDataType, OdEntry, OdObject, OdSubEntry};
pub use extension::{OdAccess, OdExtension, ReadFn, WriteFn};
pub use result::{Odr, OdResult};
pub use stream::OdStream;
