use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;
use w2w_sdk::{
    Error, HandlerError, KeyDocument, MemoryDocumentStore, Poller, RelayConfig,
    RelayMessageProvider, RelayTransport, VerificationProtocol,
    protocol::{Role, Stage},
    store::{add_key_document, key_document_for, key_documents},
    transport::{GetMessages, SendMessage},
};

#[derive(Debug, Parser)]
#[command(name = "w2w")]
#[command(about = "Send and receive wallet-to-wallet messages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(
        short,
        long,
        default_value = "wallet.json",
        help = "Wallet file path"
    )]
    database: String,
    #[arg(
        short,
        long,
        env = "W2W_RELAY_URL",
        default_value = "http://localhost:3000",
        help = "Relay base URL"
    )]
    relay: Url,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate a new did:key identity
    Create {
        #[arg(short, long)]
        alias: Option<String>,
    },
    #[command(arg_required_else_help = true)]
    Print { alias: String },
    /// Send the JSON body read from stdin
    #[command(arg_required_else_help = true)]
    Send {
        #[arg(short, long, required = true)]
        sender: String,
        #[arg(short, long, required = true)]
        receiver: String,
        #[arg(
            short = 't',
            long = "type",
            default_value = "https://didcomm.org/basicmessage/2.0/message"
        )]
        message_type: String,
        #[arg(long, help = "Deliver to the receiver's messaging service")]
        direct: bool,
    },
    /// Print the messages waiting on the relay
    Receive {
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long, help = "Do not decode the messages")]
        raw: bool,
        #[arg(long, help = "Remove the printed messages from the relay")]
        ack: bool,
    },
    /// Ask a holder to prove the proof request read from a file
    #[command(arg_required_else_help = true)]
    Verify {
        #[arg(short, long, required = true)]
        verifier: String,
        #[arg(short = 'H', long, required = true)]
        holder: String,
        #[arg(short, long, required = true)]
        template: PathBuf,
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
    /// Answer verification messages until interrupted
    Listen {
        #[arg(short, long, help = "Presentation to answer proof requests with")]
        presentation: Option<PathBuf>,
        #[arg(short, long, default_value_t = 5)]
        interval: u64,
        #[arg(long, help = "Poll the relay only once")]
        one: bool,
    },
    #[command(arg_required_else_help = true)]
    RegisterPush { token: String },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("{0}")]
    W2w(#[from] Error),
    #[error("could not access {0}: {1}")]
    Io(String, std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

type Aliases = HashMap<String, String>;

#[derive(Serialize, Deserialize, Default)]
struct DatabaseContents {
    documents: Vec<Value>,
    aliases: Aliases,
}

struct Wallet {
    store: Arc<MemoryDocumentStore>,
    aliases: Aliases,
}

impl Wallet {
    fn resolve_alias(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

async fn write_database(database_file: &str, wallet: &Wallet) -> Result<(), CliError> {
    let contents = DatabaseContents {
        documents: wallet.store.export().map_err(Error::from)?,
        aliases: wallet.aliases.clone(),
    };

    tokio::fs::write(database_file, serde_json::to_string_pretty(&contents)?)
        .await
        .map_err(|e| CliError::Io(database_file.to_string(), e))?;

    trace!("persisted wallet to {database_file}");

    Ok(())
}

async fn read_database(database_file: &str) -> Result<Wallet, CliError> {
    let store = Arc::new(MemoryDocumentStore::new());

    if !Path::new(database_file).exists() {
        let wallet = Wallet {
            store,
            aliases: Aliases::new(),
        };
        write_database(database_file, &wallet).await?;

        info!("created new wallet");

        return Ok(wallet);
    }

    let contents: DatabaseContents = read_json(Path::new(database_file)).await?;
    store.import(contents.documents).map_err(Error::from)?;

    trace!("opened wallet {database_file}");

    Ok(Wallet {
        store,
        aliases: contents.aliases,
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::Io(path.display().to_string(), e))?;

    Ok(serde_json::from_str(&contents)?)
}

fn protocol(wallet: &Wallet, transport: &Arc<RelayTransport>) -> VerificationProtocol {
    let provider = RelayMessageProvider::new(transport.clone(), wallet.store.clone());

    VerificationProtocol::new(wallet.store.clone(), Arc::new(provider))
}

async fn run() -> Result<(), CliError> {
    let args = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().compact().without_time())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if args.verbose {
                    "w2w=trace,w2w_sdk=trace"
                } else {
                    "w2w=info,w2w_sdk=info"
                }
                .into()
            }),
        )
        .init();

    let mut wallet = read_database(&args.database).await?;
    let transport = Arc::new(RelayTransport::new(RelayConfig::new(args.relay)).map_err(Error::from)?);

    match args.command {
        Commands::Create { alias } => {
            let key_doc = KeyDocument::generate_did_key();
            add_key_document(wallet.store.as_ref(), &key_doc)
                .await
                .map_err(Error::from)?;

            if let Some(alias) = alias {
                wallet
                    .aliases
                    .insert(alias.clone(), key_doc.controller.clone());
                info!("added alias {alias} -> {}", key_doc.controller);
            }

            write_database(&args.database, &wallet).await?;

            info!("created identity {}", key_doc.controller);
            println!("{}", key_doc.controller);
        }
        Commands::Print { alias } => {
            print!("{}", wallet.resolve_alias(&alias));
        }
        Commands::Send {
            sender,
            receiver,
            message_type,
            direct,
        } => {
            let sender = wallet.resolve_alias(&sender);
            let receiver = wallet.resolve_alias(&receiver);
            let key_doc = key_document_for(wallet.store.as_ref(), &sender)
                .await
                .map_err(Error::from)?;

            let mut body = String::new();
            tokio::io::stdin()
                .read_to_string(&mut body)
                .await
                .map_err(|e| CliError::Io("stdin".to_string(), e))?;
            let payload: Value = serde_json::from_str(&body)?;

            let answer = transport
                .send_message(SendMessage {
                    sender: &key_doc,
                    recipient_did: &receiver,
                    message_type: &message_type,
                    payload,
                    use_did_service_endpoint: direct,
                })
                .await
                .map_err(Error::from)?;

            info!("sent {message_type} from {sender} to {receiver}");
            trace!("relay answered {answer}");
        }
        Commands::Receive { limit, raw, ack } => {
            let key_docs = key_documents(wallet.store.as_ref())
                .await
                .map_err(Error::from)?;

            let messages = transport
                .get_messages(GetMessages {
                    key_docs: &key_docs,
                    limit,
                    skip_resolution: raw,
                })
                .await
                .map_err(Error::from)?;

            info!("received {} message(s)", messages.len());

            let mut handled = HashMap::<String, Vec<String>>::new();
            for message in messages {
                println!("{}", serde_json::to_string(&message)?);
                handled.entry(message.to).or_default().push(message.id);
            }

            if ack {
                for (did, ids) in handled {
                    transport
                        .ack_messages(&did, &ids)
                        .await
                        .map_err(Error::from)?;
                }
            }
        }
        Commands::Verify {
            verifier,
            holder,
            template,
            timeout,
        } => {
            let verifier = wallet.resolve_alias(&verifier);
            let holder = wallet.resolve_alias(&holder);
            let template: Value = read_json(&template).await?;

            let outcome = Arc::new(Mutex::new(None));
            let mut protocol = protocol(&wallet, &transport);

            let recorded = outcome.clone();
            protocol.set_presentation_handler(move |presentation, proof_request| {
                let result = evaluate_presentation(&presentation, &proof_request);

                if let Ok(mut outcome) = recorded.lock() {
                    *outcome = Some(result.clone());
                }

                async move { Ok(result) }
            });

            let protocol = Arc::new(protocol);
            let proof_request_id = protocol
                .start_verification(&verifier, &holder, template)
                .await
                .map_err(Error::from)?;

            // the template must survive a restart of the verifier
            write_database(&args.database, &wallet).await?;

            info!("invited {holder} to proof request {proof_request_id}");

            let poller = Poller::new(transport.clone(), protocol.clone(), wallet.store.clone());

            let verified = await_verification(&poller, &protocol, &proof_request_id, &holder);

            tokio::time::timeout(Duration::from_secs(timeout), verified)
                .await
                .map_err(|_| CliError::Timeout(format!("proof request {proof_request_id}")))??;

            let result = outcome.lock().ok().and_then(|outcome| outcome.clone());
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Listen {
            presentation,
            interval,
            one,
        } => {
            let mut protocol = protocol(&wallet, &transport);

            if let Some(path) = presentation {
                let presentation: Value = read_json(&path).await?;

                protocol.set_proof_request_handler(move |proof_request| {
                    trace!("answering proof request {proof_request}");
                    let presentation = presentation.clone();

                    async move { Ok(presentation) }
                });
            }

            protocol.set_presentation_handler(|presentation, proof_request| async move {
                Ok(evaluate_presentation(&presentation, &proof_request))
            });

            protocol.set_presentation_ack_handler(|result| async move {
                info!("verifier answered {result}");

                Ok::<(), HandlerError>(())
            });

            let poller = Poller::new(transport.clone(), Arc::new(protocol), wallet.store.clone())
                .with_interval(Duration::from_secs(interval));

            if one {
                let report = poller.poll_once().await?;
                info!(
                    "received {}, dispatched {}, dropped {}, acknowledged {}",
                    report.received, report.dispatched, report.dropped, report.acknowledged
                );
            } else {
                let cancel = CancellationToken::new();
                let stop = cancel.clone();

                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        stop.cancel();
                    }
                });

                info!("listening for messages...");
                poller.run(cancel).await?;
            }
        }
        Commands::RegisterPush { token } => {
            let key_docs = key_documents(wallet.store.as_ref())
                .await
                .map_err(Error::from)?;

            transport
                .register_push_token(&key_docs, &token)
                .await
                .map_err(Error::from)?;

            info!("registered push token for {} identities", key_docs.len());
        }
    }

    Ok(())
}

/// Poll until the verifier sent `holder` the result of `proof_request_id`
async fn await_verification(
    poller: &Poller,
    protocol: &VerificationProtocol,
    proof_request_id: &str,
    holder: &str,
) -> Result<(), Error> {
    loop {
        poller.poll_once().await?;
        protocol.wait_for(proof_request_id).await?;

        let verified = protocol
            .session(proof_request_id, Role::Verifier, holder)?
            .is_some_and(|session| session.stage == Stage::Verified);

        if verified {
            return Ok(());
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

/// Accepts any presentation that is a JSON object
///
/// Credential checks belong to the wallet embedding this library.
fn evaluate_presentation(presentation: &Value, proof_request: &Value) -> Value {
    trace!("evaluating presentation against {proof_request}");

    json!({ "verified": presentation.is_object() })
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
