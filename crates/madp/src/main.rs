//! # MADP Transfer Tool
//!
//! Runs one endpoint of a MADP transfer: the reliable datagram sender or
//! receiver, the chunk-framed stream-variant endpoints used as a comparison
//! baseline, the workload object generator, or the result-log extractor.
//! Endpoint addresses and directories come from `config.toml`.

use log::{Level, error, info};
use madp_log::MadpLogger;
use madp_proto::stream;
use madp_proto::{MadpReceiver, MadpSender, SenderConfig, Workload};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream, UdpSocket};

mod config;
mod objects;
mod results;

use config::Config;
use config::error::ConfigError;

const USAGE: &str =
    "usage: madp <send | recv | stream-send | stream-recv | gen-objects | extract-results <log> <csv>>";

#[derive(thiserror::Error, Debug)]
pub(crate) enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("transfer error: {0}")]
    Transfer(#[from] madp_proto::TransferError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("object file '{path}': {source}")]
    Object {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) type Result<T> = std::result::Result<T, AppError>;

#[tokio::main]
async fn main() {
    MadpLogger::init(Level::Info).unwrap();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let outcome = match args.first().map(String::as_str) {
        Some("send") => run_send().await,
        Some("recv") => run_recv().await,
        Some("stream-send") => run_stream_send().await,
        Some("stream-recv") => run_stream_recv().await,
        Some("gen-objects") => gen_objects(),
        Some("extract-results") if args.len() == 3 => extract_results(&args[1], &args[2]),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(e) = outcome {
        error!("{e}");
        std::process::exit(1);
    }
}

fn load_workload(config: &Config) -> Result<Arc<Workload>> {
    let sources = objects::load_objects(&config.transfer.objects_dir)?;
    let workload = Workload::from_objects(sources)?;
    info!(
        "loaded workload: {} chunks across {} objects",
        workload.len(),
        2 * objects::OBJECTS_PER_CLASS
    );
    Ok(Arc::new(workload))
}

async fn run_send() -> Result<()> {
    let config = config::handle()?;
    let workload = load_workload(&config)?;

    let ack_socket = UdpSocket::bind(config.ack_addr()?).await?;
    let data_socket = UdpSocket::bind("0.0.0.0:0").await?;
    let sender = MadpSender::new(
        data_socket,
        ack_socket,
        config.data_addr()?,
        workload,
        SenderConfig {
            receive_window: config.transfer.receive_window,
        },
    );
    info!("sending toward {}", config.network.data_addr);
    let report = sender.run().await?;

    println!("Total Time: {:.6}", report.elapsed.as_secs_f64());
    Ok(())
}

async fn run_recv() -> Result<()> {
    let config = config::handle()?;
    let output_dir = config.transfer.output_dir.clone();
    std::fs::create_dir_all(&output_dir)?;

    let data_socket = UdpSocket::bind(config.data_addr()?).await?;
    let ack_socket = UdpSocket::bind("0.0.0.0:0").await?;
    let receiver = MadpReceiver::new(data_socket, ack_socket, config.ack_addr()?);
    info!("receiving on {}", config.network.data_addr);
    let report = receiver
        .run(|object| objects::write_object(&output_dir, &object))
        .await?;

    info!(
        "reconstructed {} objects into {}",
        report.completed_objects,
        output_dir.display()
    );
    println!("Total Time: {:.6}", report.elapsed.as_secs_f64());
    Ok(())
}

async fn run_stream_send() -> Result<()> {
    let config = config::handle()?;
    let workload = load_workload(&config)?;

    let listener = TcpListener::bind(config.stream_addr()?).await?;
    info!(
        "waiting for the stream receiver on {}",
        config.network.stream_addr
    );
    let (mut stream, peer) = listener.accept().await?;
    info!("receiver {peer} connected");
    stream::send_framed(&mut stream, &workload).await?;
    info!("all objects sent");
    Ok(())
}

async fn run_stream_recv() -> Result<()> {
    let config = config::handle()?;
    let output_dir = config.transfer.output_dir.clone();
    std::fs::create_dir_all(&output_dir)?;

    let mut stream = TcpStream::connect(config.stream_addr()?).await?;
    info!("connected to {}", config.network.stream_addr);
    let started = Instant::now();
    let completed =
        stream::recv_framed(&mut stream, |object| objects::write_object(&output_dir, &object))
            .await?;

    info!(
        "reconstructed {} objects into {}",
        completed,
        output_dir.display()
    );
    println!("Total Time: {:.6}", started.elapsed().as_secs_f64());
    Ok(())
}

fn gen_objects() -> Result<()> {
    let config = config::handle()?;
    objects::generate_objects(&config.transfer.objects_dir)
}

fn extract_results(log: &str, csv: &str) -> Result<()> {
    let rows = results::extract_to_csv(Path::new(log), Path::new(csv))?;
    info!("extracted {rows} result rows into {csv}");
    Ok(())
}
