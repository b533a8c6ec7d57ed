mod chat;
mod mirror;

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use rigelnet::sync::register_sync_rpcs;
use rigelnet::{Client, Event, HandlerRegistry, NodeConfig, PacketLossSimulation, UpdateMode};

use chat::{Say, register_chat_rpcs};
use mirror::Mirror;

/// Must match the server's destroy delay.
const DESTROY_DELAY_STEPS: u32 = 6;

#[derive(Parser)]
#[command(name = "rigelnet-client")]
#[command(about = "Headless RigelNet demo client")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1:27015")]
    server: SocketAddr,

    #[arg(long, default_value_t = 0, help = "Local UDP port (0 picks any)")]
    local_port: u16,

    #[arg(long, default_value = "rigel")]
    passphrase: String,

    #[arg(short, long, default_value = "anon")]
    name: String,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(long, default_value_t = 5, help = "Seconds between chat lines (0 disables)")]
    chat_every: u64,

    #[arg(long, default_value_t = 0, help = "Disconnect after this many seconds (0 runs forever)")]
    duration: u64,

    #[arg(long, default_value_t = 5000, help = "Connection timeout in ms (0 disables)")]
    timeout_ms: u64,

    #[arg(long, help = "Enable packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let builder = register_sync_rpcs::<Mirror>(HandlerRegistry::builder())?;
    let registry = Arc::new(register_chat_rpcs(builder)?.build()?);

    let config = NodeConfig {
        timeout_limit: Duration::from_millis(args.timeout_ms),
        packet_loss: args
            .simulate_packet_loss
            .then(|| PacketLossSimulation::new(args.loss_percent)),
        ..NodeConfig::new(args.passphrase.clone())
    };

    let mut client = Client::new(config, registry)?;
    client.set_user_data(Mirror::new(DESTROY_DELAY_STEPS));
    client.connect(args.local_port, args.server)?;

    run(&mut client, &args);

    if let Some(mirror) = client.user_data::<Mirror>() {
        log::info!(
            "Mirrored {} orbiters, {} destroyed",
            mirror.spawner.created,
            mirror.spawner.destroyed
        );
    }
    Ok(())
}

fn run(client: &mut Client, args: &Args) {
    let tick = Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64);
    let chat_every = Duration::from_secs(args.chat_every);
    let started = Instant::now();
    let mut last_chat = Instant::now();
    let mut last_report = Instant::now();
    let mut chat_count = 0u32;

    loop {
        client.update(UpdateMode::Receive);
        while let Some(event) = client.poll_event() {
            log_event(&event);
        }
        if !client.is_running() {
            break;
        }

        let connected = client.client_index().is_some()
            && client.server_connector().status() == rigelnet::ConnectorStatus::Connected;

        if connected && !chat_every.is_zero() && last_chat.elapsed() >= chat_every {
            chat_count += 1;
            let line = format!("{} says hello #{}", args.name, chat_count);
            if let Err(e) = client.compose::<Say>(&line) {
                log::warn!("Failed to send chat: {}", e);
            }
            last_chat = Instant::now();
        }

        if let Some(mirror) = client.user_data_mut::<Mirror>() {
            mirror.spawner.step();
        }

        if last_report.elapsed() >= Duration::from_secs(2) {
            report(client);
            last_report = Instant::now();
        }

        client.update(UpdateMode::Send);

        if args.duration > 0 && started.elapsed() >= Duration::from_secs(args.duration) {
            log::info!("Run time elapsed, disconnecting");
            client.disconnect(true);
            while let Some(event) = client.poll_event() {
                log_event(&event);
            }
            break;
        }

        thread::sleep(tick);
    }
}

fn log_event(event: &Event) {
    match event {
        Event::Connected { .. } => log::info!("Connected to server"),
        Event::Disconnected {
            reason, message, ..
        } => log::info!("Connection {}: {}", reason.as_str(), message),
        Event::ConnectAttemptFailed { reason, .. } => {
            log::warn!("Connect attempt failed: {:?}", reason)
        }
        Event::BadPassphrase { passphrase, .. } => {
            log::warn!("Server answered with passphrase {:?}", passphrase)
        }
    }
}

fn report(client: &Client) {
    let Some(mirror) = client.user_data::<Mirror>() else {
        return;
    };
    let remote = client.server_connector().remote_info();
    let active = mirror.orbiters().filter(|(_, o)| o.active).count();

    log::info!(
        "{} orbiters ({} active, {} retiring), latency {:?} mean / {:?} worst",
        mirror.objects.len(),
        active,
        mirror.spawner.retiring(),
        remote.mean_latency,
        remote.pessimistic_latency,
    );
    if let Some((id, orbiter)) = mirror.orbiters().next() {
        log::debug!(
            "{} at ({:.2}, {:.2}, {:.2}) on radius {:.1} at {:.2} rad/s after {} updates",
            id,
            orbiter.position.x,
            orbiter.position.y,
            orbiter.position.z,
            orbiter.radius,
            orbiter.angular_speed,
            orbiter.updates
        );
    }
}
