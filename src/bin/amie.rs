use std::{path::PathBuf, sync::Arc};
use amie_dispatch::handlers::{self, UserDirectory};
use amie_dispatch::packet::read_packets;
use amie_dispatch::prelude::*;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use log::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version = "1.0", author = "Felix Watts", about = "Utilities related to AMIE packet dispatch.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the packet types this site handles
    Types,
    /// Dispatch newline-delimited JSON packets against a dry-run directory
    Dispatch {
        file: PathBuf,
        /// Hold every change for operator review instead of applying it
        #[arg(long)]
        hold: bool,
    },
    /// Print the reply each packet would get if its action completed
    Reply {
        file: PathBuf,
    },
}

/// A directory that changes nothing. Each change is logged and either accepted or held for an operator.
struct DryRunDirectory {
    hold: bool,
}

impl DryRunDirectory {
    fn apply(&self, change: String, packet: &ActionPacket) -> ActionResult<Option<TaskStatus>> {
        if self.hold {
            return Ok(Some(TaskStatus::blocked_on_operator(packet, change)));
        }

        info!("Dry run: {}", change);
        Ok(None)
    }
}

#[async_trait]
impl UserDirectory for DryRunDirectory {
    async fn modify_user(&self, packet: &ActionPacket) -> ActionResult<Option<TaskStatus>> {
        let person_id = packet.field_str("person_id")?;
        let action_type = packet.field_str("action_type")?;
        self.apply(format!("{} person {}", action_type, person_id), packet)
    }

    async fn merge_person(
        &self,
        keep_person_id: &str,
        delete_person_id: &str,
        packet: &ActionPacket,
    ) -> ActionResult<Option<TaskStatus>> {
        self.apply(format!("merge person {} into {}", delete_person_id, keep_person_id), packet)
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("{}", &e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> AmieResult<()> {
    let command = Cli::parse();
    match command.command {
        Commands::Types => {
            let dispatcher = dispatcher(false)?;
            for packet_type in dispatcher.registry().packet_types() {
                println!("{packet_type}");
            }
        },
        Commands::Dispatch { file, hold } => {
            let dispatcher = dispatcher(hold)?;
            let store = MemoryTaskStore::new();
            for packet in read_packets(&file).await? {
                match dispatcher.respond(&packet).await? {
                    Response::Transmit(reply) => println!("{}", reply.to_json()?),
                    Response::Persist(task) => {
                        println!("# held {}", &task);
                        store.insert_pending(task).await?;
                    }
                }
            }

            let pending = store.pending().await;
            if !pending.is_empty() {
                println!("# {} task(s) awaiting an operator", pending.len());
            }
        },
        Commands::Reply { file } => {
            for packet in read_packets(&file).await? {
                let reply = packet
                    .create_reply(PacketBody::new())
                    .unwrap_or_else(|e| packet.create_failure_reply(&e));
                println!("{}", reply.to_json()?);
            }
        },
    }

    Ok(())
}

fn dispatcher(hold: bool) -> AmieResult<Dispatcher> {
    let mut builder = RegistryBuilder::new(Arc::new(DryRunDirectory { hold }));
    handlers::install(&mut builder)?;
    Ok(Dispatcher::new(builder.seal()))
}
