use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{config::BusConfig, handler::MessageHandler};

use super::{
    ThreadPool,
    codec::{Codec, CodecError},
    dispatcher::Dispatcher,
    registry::TypeRegistry,
    transport::{ProtocolTransport, TransportError},
};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode reply: {0}")]
    Codec(#[from] CodecError),
    #[error("Server IO Error: {0}")]
    Io(#[from] io::Error),
}

/// Answers every frame read from `transport` until the peer closes the stream,
/// returning the number of replies written.
///
/// Frames that cannot be decoded are answered with an error reply; only a broken
/// stream ends the session early.
pub fn serve_connection<T, H, C>(
    transport: &mut ProtocolTransport<T>,
    dispatcher: &Dispatcher<'_, C>,
    handler: &Mutex<H>,
    served: &AtomicUsize,
) -> Result<usize, ServeError>
where
    T: Read + Write,
    H: MessageHandler,
    C: Codec,
{
    let mut answered = 0;
    while let Some(frame) = transport.read_frame()? {
        let reply = match dispatcher.decode_frame(&frame) {
            Ok(message) => {
                debug!("handling message {} {}", message.type_code(), message.id());
                handler
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .handle(message.as_ref())
            }
            Err(reply) => reply,
        };
        let frame = dispatcher.encode_reply_or_error(reply.as_ref())?;
        transport.write_frame(&frame)?;
        served.fetch_add(1, Ordering::Relaxed);
        answered += 1;
    }
    Ok(answered)
}

/// TCP front end sharing one handler between all connections.
pub struct BusServer<H> {
    listener: TcpListener,
    handler: Arc<Mutex<H>>,
    registry: &'static TypeRegistry,
    max_frame_size: usize,
    served: Arc<AtomicUsize>,
    pool: ThreadPool,
}

impl<H: MessageHandler + Send + 'static> BusServer<H> {
    pub fn bind(
        address: SocketAddr,
        handler: H,
        registry: &'static TypeRegistry,
        config: &BusConfig,
    ) -> Result<Self, ServeError> {
        Ok(Self {
            listener: TcpListener::bind(address)?,
            handler: Arc::new(Mutex::new(handler)),
            registry,
            max_frame_size: config.max_frame_size,
            served: Arc::new(AtomicUsize::new(0)),
            pool: ThreadPool::new(config.workers),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Counter of replies sent over all connections.
    pub fn served(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.served)
    }

    pub fn listen(self) -> Result<(), ServeError> {
        info!("listening at {}", self.local_addr()?);

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let handler = Arc::clone(&self.handler);
                    let served = Arc::clone(&self.served);
                    let registry = self.registry;
                    let max_frame_size = self.max_frame_size;
                    self.pool.execute(move || {
                        if let Err(e) =
                            handle_connection(stream, registry, max_frame_size, &handler, &served)
                        {
                            warn!("connection failed: {e}");
                        }
                    });
                }
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
        Ok(())
    }
}

fn handle_connection<H: MessageHandler>(
    stream: TcpStream,
    registry: &'static TypeRegistry,
    max_frame_size: usize,
    handler: &Mutex<H>,
    served: &AtomicUsize,
) -> Result<(), ServeError> {
    let peer = stream.peer_addr()?;
    let dispatcher = Dispatcher::new(registry);
    let mut transport = ProtocolTransport::with_max_frame_size(stream, max_frame_size);

    let answered = serve_connection(&mut transport, &dispatcher, handler, served)?;
    info!("connection from {peer} closed after {answered} replies");
    Ok(())
}
