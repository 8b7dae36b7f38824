use core::{
    fmt::{self, Display, Formatter},
    future::Future,
    time::Duration,
};

use bytes::Bytes;

use crate::error::CallError;

/// Raw request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReq {
    pub id: i64,
    pub req: Bytes,
}

/// Raw response, as seen by the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResp {
    pub id: i64,
    pub resp: Bytes,
    /// Transport-level error description, if the call failed.
    pub err: Option<String>,
    pub elapsed: Duration,
}

/// Call result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RetCode {
    Success = 0,
    /// The call exceeded its deadline.
    WarningCallTimeout = 1001,
    /// The call itself failed, i.e. at transport level.
    ErrorCall = 2001,
    /// Malformed or inconsistent response.
    ErrorResponse = 2002,
    /// The callee reported an error.
    ErrorCallee = 2003,
    /// Unrecovered fault while building or dispatching a call.
    FatalCall = 3001,
}

impl RetCode {
    pub const ALL: [RetCode; 6] = [
        Self::Success,
        Self::WarningCallTimeout,
        Self::ErrorCall,
        Self::ErrorResponse,
        Self::ErrorCallee,
        Self::FatalCall,
    ];

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::WarningCallTimeout => "call timeout",
            Self::ErrorCall => "call error",
            Self::ErrorResponse => "response error",
            Self::ErrorCallee => "callee error",
            Self::FatalCall => "fatal call",
        }
    }
}

impl Display for RetCode {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        write!(fmt, "{}", self.as_u32())
    }
}

/// The unit delivered to the result consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub id: i64,
    pub req: Option<RawReq>,
    pub resp: Option<RawResp>,
    pub code: RetCode,
    pub msg: String,
    pub elapsed: Duration,
}

impl CallResult {
    /// Constructs a result for the given request.
    pub fn new(req: &RawReq, code: RetCode, msg: impl Into<String>) -> Self {
        Self {
            id: req.id,
            req: Some(req.clone()),
            resp: None,
            code,
            msg: msg.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// Constructs a result that can not be attributed to any request.
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self {
            id: -1,
            req: None,
            resp: None,
            code: RetCode::FatalCall,
            msg: msg.into(),
            elapsed: Duration::ZERO,
        }
    }

    #[inline]
    pub fn with_resp(mut self, resp: RawResp) -> Self {
        self.resp = Some(resp);
        self
    }
}

/// Load target.
///
/// Builds requests, performs calls and validates responses. Shared between
/// all in-flight calls, so every method may be invoked concurrently.
pub trait Caller: Send + Sync + 'static {
    /// Builds a new request with a fresh identifier.
    fn build_req(&self) -> Result<RawReq, CallError>;

    /// Performs a single call.
    ///
    /// The `timeout` is a best-effort deadline for the underlying transport;
    /// the generator enforces its own deadline independently.
    fn call(&self, req: Bytes, timeout: Duration) -> impl Future<Output = Result<Bytes, CallError>> + Send;

    /// Validates the response against the originating request.
    fn check_resp(&self, req: &RawReq, resp: &RawResp) -> CallResult;
}
