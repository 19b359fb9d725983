use std::{
    error::Error,
    io::{self, Write},
    net::SocketAddr,
    process,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use clap::{Parser, Subcommand};
use log::info;

use docbus::{
    BusConfig, MemoryDocumentStore, Operation,
    protocol::{
        BusServer, Dispatcher, Duplex, EmptyReply, Frame, Message, ProtocolTransport, Reply,
        documents::{RemoveDocumentReply, UpdateDocumentReply},
        registry::{self, Factory},
        serve_connection,
    },
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    config: BusConfig,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the registered type codes of the protocol
    Types,
    /// Write one message frame per operation to stdout
    Encode {
        /// Operations such as "remove id:music:song::a"
        #[arg(required = true)]
        operations: Vec<String>,
    },
    /// Answer message frames from an in-memory document store
    Serve {
        /// Listen for TCP connections instead of reading stdin
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Print the frames read from stdin
    Inspect,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let registry = registry::init()?;
    let dispatcher = Dispatcher::new(registry);

    match cli.command {
        Command::Types => {
            let protocol = registry.protocol(&cli.config.protocol)?;
            for (code, factory) in protocol.type_codes() {
                match factory {
                    Factory::Message(_) => {
                        let reply = protocol.paired_reply_code(code)?;
                        println!("{code}\tmessage\treplied by {reply}");
                    }
                    Factory::Reply(_) => println!("{code}\treply"),
                }
            }
        }
        Command::Encode { operations } => {
            let mut transport = ProtocolTransport::with_max_frame_size(
                Duplex {
                    reader: io::empty(),
                    writer: StdOut {
                        inner: io::stdout().lock(),
                    },
                },
                cli.config.max_frame_size,
            );
            for op in operations {
                let message = op
                    .parse::<Operation>()?
                    .into_message(cli.config.priority, cli.config.trace_level);
                transport.write_frame(&dispatcher.encode_message(message.as_ref())?)?;
                info!("encoded message {} {}", message.type_code(), message.id());
            }
        }
        Command::Serve { listen: Some(address) } => {
            let server =
                BusServer::bind(address, MemoryDocumentStore::default(), registry, &cli.config)?;
            report_on_interrupt(server.served())?;
            server.listen()?;
        }
        Command::Serve { listen: None } => {
            let served = Arc::new(AtomicUsize::new(0));
            report_on_interrupt(Arc::clone(&served))?;

            let mut transport = ProtocolTransport::with_max_frame_size(
                Duplex {
                    reader: io::stdin().lock(),
                    writer: StdOut {
                        inner: io::stdout().lock(),
                    },
                },
                cli.config.max_frame_size,
            );
            let handler = Mutex::new(MemoryDocumentStore::default());
            let answered = serve_connection(&mut transport, &dispatcher, &handler, &served)?;
            info!("served {answered} replies");
        }
        Command::Inspect => {
            let mut transport = ProtocolTransport::with_max_frame_size(
                Duplex {
                    reader: io::stdin().lock(),
                    writer: io::sink(),
                },
                cli.config.max_frame_size,
            );
            while let Some(frame) = transport.read_frame()? {
                inspect(&dispatcher, &frame)?;
            }
        }
    }

    Ok(())
}

/// Prints the number of replies sent and exits on Ctrl-C.
fn report_on_interrupt(served: Arc<AtomicUsize>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        eprintln!("served {} replies", served.load(Ordering::Relaxed));
        process::exit(0);
    })
}

fn inspect(dispatcher: &Dispatcher<'_>, frame: &Frame) -> Result<(), Box<dyn Error>> {
    let is_reply = frame.type_code == EmptyReply::TYPE_CODE
        || dispatcher
            .registry()
            .lookup(&frame.protocol, frame.type_code)?
            .is_reply();

    if !is_reply {
        let message = dispatcher.decode(&frame.protocol, frame.type_code, &frame.payload)?;
        println!("message {} {:?}", message.type_code(), message);
        return Ok(());
    }

    let reply = dispatcher.decode_reply(frame)?;
    let in_reply_to = reply
        .in_reply_to()
        .map_or_else(|| "?".to_string(), |id| id.to_string());
    let outcome = if reply.status().is_ok() {
        "ok"
    } else if reply.has_errors() {
        "failed"
    } else {
        "unset"
    };
    print!("reply {} to {in_reply_to}: {outcome}", reply.type_code());
    if let Some(found) = found(reply.as_ref()) {
        print!(", found={found}");
    }
    println!();
    for error in reply.errors() {
        println!("  {error}");
    }
    Ok(())
}

fn found(reply: &dyn Reply) -> Option<bool> {
    if let Some(reply) = reply.downcast_ref::<RemoveDocumentReply>() {
        Some(reply.was_found())
    } else {
        reply
            .downcast_ref::<UpdateDocumentReply>()
            .map(UpdateDocumentReply::was_found)
    }
}

/// StdOut wrapper that flushes after every write so frames reach the next process
/// in a pipe immediately.
struct StdOut<W: Write> {
    inner: W,
}

impl<W: Write> Write for StdOut<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res = self.inner.write(buf);
        if res.is_ok() {
            self.inner.flush()?
        }
        res
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
