use core::{
    net::SocketAddr,
    sync::atomic::{AtomicI64, Ordering},
    time::Duration,
};
use std::io;

use bytes::Bytes;
use rand::Rng;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    time,
};

use super::proto::{self, ServerReq, ServerResp, DELIM, OPERATORS};
use crate::{
    caller::{CallResult, Caller, RawReq, RawResp, RetCode},
    error::CallError,
};

static NEXT_ID: AtomicI64 = AtomicI64::new(1);

/// TCP caller, performing a single arithmetic request per connection.
#[derive(Debug, Clone)]
pub struct TcpComm {
    addr: SocketAddr,
}

impl TcpComm {
    #[inline]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connects, sends the request line and reads the response line.
    async fn exchange(&self, req: &[u8]) -> Result<Bytes, CallError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        let (rd, mut wr) = stream.split();

        wr.write_all(req).await?;
        wr.write_u8(DELIM).await?;
        wr.flush().await?;

        let mut buf = Vec::new();
        BufReader::new(rd).read_until(DELIM, &mut buf).await?;
        if buf.pop() != Some(DELIM) {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        Ok(Bytes::from(buf))
    }
}

impl Caller for TcpComm {
    fn build_req(&self) -> Result<RawReq, CallError> {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        let mut rng = rand::thread_rng();
        let req = ServerReq {
            id,
            operands: vec![rng.gen_range(1..=1000), rng.gen_range(1..=1000)],
            operator: OPERATORS[rng.gen_range(0..OPERATORS.len())].to_string(),
        };
        let req = serde_json::to_vec(&req)?;

        Ok(RawReq { id, req: Bytes::from(req) })
    }

    async fn call(&self, req: Bytes, timeout: Duration) -> Result<Bytes, CallError> {
        time::timeout(timeout, self.exchange(&req))
            .await
            .map_err(|_| CallError::Timeout(timeout))?
    }

    fn check_resp(&self, req: &RawReq, resp: &RawResp) -> CallResult {
        let result = |code, msg: String| CallResult::new(req, code, msg).with_resp(resp.clone());

        let sreq: ServerReq = match serde_json::from_slice(&req.req) {
            Ok(v) => v,
            Err(..) => {
                return result(
                    RetCode::FatalCall,
                    format!("Incorrectly formatted Req: {}", String::from_utf8_lossy(&req.req)),
                )
            }
        };
        let sresp: ServerResp = match serde_json::from_slice(&resp.resp) {
            Ok(v) => v,
            Err(..) => {
                return result(
                    RetCode::ErrorResponse,
                    format!("Incorrectly formatted Resp: {}", String::from_utf8_lossy(&resp.resp)),
                )
            }
        };

        if sresp.id != sreq.id {
            return result(
                RetCode::ErrorResponse,
                format!("Inconsistent raw id! ({} != {})", sreq.id, sresp.id),
            );
        }
        if let Some(err) = sresp.err {
            return result(RetCode::ErrorCallee, format!("Abnormal server: {err}!"));
        }
        if proto::op(&sreq.operands, &sreq.operator) != Ok(sresp.result) {
            return result(
                RetCode::ErrorResponse,
                format!(
                    "Incorrect result: {}!",
                    proto::formula(&sreq.operands, &sreq.operator, sresp.result, false)
                ),
            );
        }

        result(RetCode::Success, format!("Success. ({})", sresp.formula))
    }
}
