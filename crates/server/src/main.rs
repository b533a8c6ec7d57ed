mod chat;
mod config;
mod events;
mod orbiters;
mod server;
mod tui;

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use config::ServerConfig;
use rigelnet::PacketLossSimulation;
use server::DemoServer;
use tui::TuiState;

#[derive(Parser)]
#[command(name = "rigelnet-server")]
#[command(about = "RigelNet demo server")]
struct Args {
    #[arg(short, long, default_value_t = rigelnet::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 8)]
    max_clients: usize,

    #[arg(long, default_value = "rigel")]
    passphrase: String,

    #[arg(long, default_value_t = 12, help = "Number of synchronized orbiters")]
    orbiters: usize,

    #[arg(long, default_value_t = 5000, help = "Connection timeout in ms (0 disables)")]
    timeout_ms: u64,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Enable packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let packet_loss = args
        .simulate_packet_loss
        .then(|| PacketLossSimulation::new(args.loss_percent));

    let config = ServerConfig {
        port: args.port,
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        orbiter_count: args.orbiters,
        passphrase: args.passphrase,
        timeout: Duration::from_millis(args.timeout_ms),
        packet_loss,
    };

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        let mut server = DemoServer::new(config)?;
        server.run();
        log::info!("Server shutting down");
    } else {
        let mut server = DemoServer::new(config)?;
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut DemoServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let mut tui_state = TuiState::default();

    while running.load(Ordering::SeqCst) {
        server.tick_once();
        for entry in server.drain_log() {
            tui_state.push(entry);
        }

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    running.store(false, Ordering::SeqCst);
                }
            }
        }

        let stats = server.stats();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats);
        })?;
    }

    server.shutdown();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
