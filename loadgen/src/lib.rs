pub mod caller;
pub mod cfg;
pub mod cmd;
pub mod error;
pub mod generator;
mod histogram;
pub mod logging;
pub mod report;
pub mod runtime;
pub mod tcp;
pub mod tickets;

pub use self::{
    caller::{CallResult, Caller, RawReq, RawResp, RetCode},
    error::{CallError, Error, ParamError, TicketsError},
    generator::{Generator, ParamSet, Status},
    tickets::{Ticket, Tickets},
};
