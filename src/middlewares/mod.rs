// src/middlewares/mod.rs

pub mod db_session;
pub mod request_id;
pub mod update_context;

pub use db_session::DbSessionMiddleware;
pub use request_id::{
    MakeCorrelationId, REQUEST_ID_HEADER, propagate_request_id_layer, request_id_middleware, request_id_text,
    set_request_id_layer,
};
pub use update_context::UpdateContextMiddleware;
