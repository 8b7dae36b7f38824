//! Sample transport: arithmetic requests as line-delimited JSON over TCP.

mod comm;
mod proto;
mod server;

pub use self::{
    comm::TcpComm,
    proto::{formula, op, ServerReq, ServerResp, DELIM, OPERATORS},
    server::TcpServer,
};
