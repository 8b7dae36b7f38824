use core::{future::Future, net::SocketAddr};

use anyhow::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

use super::proto::{self, ServerReq, ServerResp, DELIM};

/// Arithmetic server, answering each request line with a response line.
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { listener })
    }

    #[inline]
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves connections until the `stop` future resolves.
    pub async fn run<F>(self, stop: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        log::info!("listening on {}", self.local_addr()?);
        tokio::pin!(stop);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut stop => break,
                accepted = self.listener.accept() => accepted?,
            };

            tokio::spawn(async move {
                if let Err(err) = serve(stream).await {
                    log::debug!("connection with {peer} failed: {err}");
                }
            });
        }

        log::info!("server stopped");
        Ok(())
    }
}

async fn serve(mut stream: TcpStream) -> Result<(), Error> {
    let (rd, mut wr) = stream.split();
    let mut rd = BufReader::new(rd);
    let mut line = Vec::new();

    loop {
        line.clear();
        if rd.read_until(DELIM, &mut line).await? == 0 {
            return Ok(());
        }
        if line.last() == Some(&DELIM) {
            line.pop();
        }

        let mut data = serde_json::to_vec(&respond(&line))?;
        data.push(DELIM);
        wr.write_all(&data).await?;
    }
}

/// Evaluates a single request.
pub fn respond(line: &[u8]) -> ServerResp {
    let req: ServerReq = match serde_json::from_slice(line) {
        Ok(req) => req,
        Err(err) => {
            return ServerResp {
                id: -1,
                formula: String::new(),
                result: 0,
                err: Some(format!("invalid request: {err}")),
            }
        }
    };

    match proto::op(&req.operands, &req.operator) {
        Ok(result) => ServerResp {
            id: req.id,
            formula: proto::formula(&req.operands, &req.operator, result, true),
            result,
            err: None,
        },
        Err(err) => ServerResp {
            id: req.id,
            formula: String::new(),
            result: 0,
            err: Some(err),
        },
    }
}
