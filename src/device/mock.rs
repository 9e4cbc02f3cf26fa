use crate::device::{Device, Mode};
use crate::frame;
use crate::{Error, Result};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use rand::Rng;
use tokio::sync::mpsc;

enum Inbound {
    Frame(Vec<u8>),
    Fail,
}

#[derive(Clone)]
pub struct MockDevice {
    mode: Mode,
    rx_tx: mpsc::UnboundedSender<Inbound>,
    rx_queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>>,
    tx_log: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_send: Arc<Mutex<bool>>,
    accept_limit: Arc<Mutex<Option<usize>>>,
    loss: Arc<Mutex<f64>>,
}

impl MockDevice {
    pub fn new(mode: Mode) -> Self {
        let (rx_tx, rx) = mpsc::unbounded_channel();
        Self {
            mode,
            rx_tx,
            rx_queue: Arc::new(tokio::sync::Mutex::new(rx)),
            tx_log: Arc::new(Mutex::new(Vec::new())),
            fail_send: Arc::new(Mutex::new(false)),
            accept_limit: Arc::new(Mutex::new(None)),
            loss: Arc::new(Mutex::new(0.0)),
        }
    }

    /// Queue a frame for the next `recv`.
    pub fn inject_frame(&self, desc: &str, frame: Vec<u8>) {
        println!("🧪 INJECT: {} ({} bytes)", desc, frame.len());
        let _ = self.rx_tx.send(Inbound::Frame(frame));
    }

    /// Make the next `recv` fail once the frames queued before it are consumed.
    pub fn inject_failure(&self) {
        let _ = self.rx_tx.send(Inbound::Fail);
    }

    /// Make every subsequent `send` fail.
    pub fn fail_sends(&self) {
        *self.fail_send.lock().unwrap() = true;
    }

    /// Accept at most `n` bytes per `send`, producing short writes.
    pub fn limit_sends(&self, n: usize) {
        *self.accept_limit.lock().unwrap() = Some(n);
    }

    /// Swallow a share of written frames: each `send` reports success but
    /// logs nothing with probability `ratio`, clamped to `0.0..=1.0`.
    pub fn lose_writes(&self, ratio: f64) {
        *self.loss.lock().unwrap() = ratio.clamp(0.0, 1.0);
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.tx_log.lock().unwrap().clone()
    }

    pub fn last_sent_frame(&self) -> Option<Vec<u8>> {
        self.tx_log.lock().unwrap().last().cloned()
    }

    /// Wait until at least `n` frames have been sent, or give up after `limit`.
    pub async fn wait_for_sent(&self, n: usize, limit: Duration) -> Vec<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let sent = self.sent_frames();
            if sent.len() >= n || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Device for MockDevice {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let mut queue = self.rx_queue.lock().await;
        match queue.recv().await {
            Some(Inbound::Frame(frame)) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            Some(Inbound::Fail) | None => Err(Error::Io(io::Error::from(io::ErrorKind::BrokenPipe))),
        }
    }

    async fn send(&self, buf: &[u8]) -> Result<usize> {
        if *self.fail_send.lock().unwrap() {
            return Err(Error::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }

        let loss = *self.loss.lock().unwrap();
        if rand::thread_rng().gen_bool(loss) {
            println!("🕳️ LOST: {} bytes", buf.len());
            return Ok(buf.len());
        }

        let len = match *self.accept_limit.lock().unwrap() {
            Some(limit) => buf.len().min(limit),
            None => buf.len(),
        };
        println!("📤 SEND: {} ({} bytes)", frame::summary(&buf[..len], self.mode), len);
        self.tx_log.lock().unwrap().push(buf[..len].to_vec());
        Ok(len)
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}
