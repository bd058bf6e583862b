//! Connection contract the dispatcher hands finished responses to.

use std::io;

use crate::response::Response;

pub trait Connection {
    /// Write the response and keep the connection open.
    fn send(&mut self, response: Response) -> io::Result<()>;

    /// Write the response and close the connection.
    fn close(&mut self, response: Response) -> io::Result<()>;
}

/// How a response left through a [`RecordingConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Closed,
}

/// In-memory connection that records every response.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    pub delivered: Vec<(Delivery, Response)>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&(Delivery, Response)> {
        self.delivered.last()
    }
}

impl Connection for RecordingConnection {
    fn send(&mut self, response: Response) -> io::Result<()> {
        self.delivered.push((Delivery::Sent, response));
        Ok(())
    }

    fn close(&mut self, response: Response) -> io::Result<()> {
        self.delivered.push((Delivery::Closed, response));
        Ok(())
    }
}
