//! Byte-oriented duplex link to the controller.
//!
//! Outbound bytes are written synchronously. Inbound bytes are pushed to a
//! registered [`ReceiveHandler`] as they arrive; the controller never polls
//! the link for data.

use super::error::StageResult;

/// Callback invoked with each burst of received bytes.
pub type ReceiveHandler = Box<dyn FnMut(&[u8]) + Send>;

/// Transport abstraction for controller communication.
pub trait LinkTransport: Send {
    /// Write a complete frame to the link.
    fn write(&mut self, bytes: &[u8]) -> StageResult<()>;

    /// Register the handler that receives inbound bytes, replacing any previous one.
    fn set_receive_handler(&mut self, handler: ReceiveHandler);
}

impl<L: LinkTransport + ?Sized> LinkTransport for Box<L> {
    fn write(&mut self, bytes: &[u8]) -> StageResult<()> {
        (**self).write(bytes)
    }

    fn set_receive_handler(&mut self, handler: ReceiveHandler) {
        (**self).set_receive_handler(handler)
    }
}

#[cfg(feature = "serial")]
pub use serial::SerialLink;

#[cfg(feature = "serial")]
mod serial {
    use std::io::{Read, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::thread::{self, JoinHandle};

    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
    use tracing::{debug, error, info, trace};

    use super::{LinkTransport, ReceiveHandler};
    use crate::apt::config::LinkConfig;
    use crate::apt::error::StageResult;

    type SharedHandler = Arc<Mutex<Option<ReceiveHandler>>>;

    /// Serial port link (8N1, no flow control).
    ///
    /// A background thread reads the port and delivers each burst of bytes
    /// once the line has been quiet for the configured burst gap.
    pub struct SerialLink {
        port: Box<dyn SerialPort>,
        handler: SharedHandler,
        running: Arc<AtomicBool>,
        reader: Option<JoinHandle<()>>,
    }

    impl SerialLink {
        /// Open the serial port described by `config` and start the reader thread.
        pub fn open(config: &LinkConfig) -> StageResult<Self> {
            let port = serialport::new(&config.port, config.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(config.burst_gap)
                .open()?;

            info!("Opened serial port {} at {} baud", config.port, config.baud_rate);

            let reader_port = port.try_clone()?;
            let handler: SharedHandler = Arc::new(Mutex::new(None));
            let running = Arc::new(AtomicBool::new(true));

            let reader = thread::Builder::new()
                .name("stage-link-rx".to_string())
                .spawn({
                    let handler = Arc::clone(&handler);
                    let running = Arc::clone(&running);
                    move || read_loop(reader_port, handler, running)
                })?;

            Ok(Self {
                port,
                handler,
                running,
                reader: Some(reader),
            })
        }
    }

    fn deliver(handler: &SharedHandler, burst: &[u8]) {
        trace!("Serial recv: {:02X?}", burst);
        let mut guard = handler.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(handler) => handler(burst),
            None => debug!("Dropping {} bytes received before a handler was set", burst.len()),
        }
    }

    fn read_loop(mut port: Box<dyn SerialPort>, handler: SharedHandler, running: Arc<AtomicBool>) {
        let mut buf = [0u8; 256];
        let mut burst = Vec::new();

        while running.load(Ordering::Relaxed) {
            match port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    burst.extend_from_slice(&buf[..n]);
                    continue;
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    error!("Serial read failed, stopping reader: {e}");
                    break;
                }
            }

            // Line quiet for one burst gap
            if !burst.is_empty() {
                deliver(&handler, &burst);
                burst.clear();
            }
        }
    }

    impl LinkTransport for SerialLink {
        fn write(&mut self, bytes: &[u8]) -> StageResult<()> {
            trace!("Serial send: {:02X?}", bytes);
            self.port.write_all(bytes)?;
            self.port.flush()?;
            Ok(())
        }

        fn set_receive_handler(&mut self, handler: ReceiveHandler) {
            *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
        }
    }

    impl Drop for SerialLink {
        fn drop(&mut self) {
            self.running.store(false, Ordering::Relaxed);
            if let Some(reader) = self.reader.take() {
                let _ = reader.join();
            }
        }
    }
}
