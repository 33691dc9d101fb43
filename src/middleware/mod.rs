pub mod update_id;

pub use update_id::{make_span_with_update_id, update_id_middleware, UpdateId, UPDATE_ID_HEADER};
