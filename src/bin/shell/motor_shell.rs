//! Motor Shell - Interactive controller for motord
//!
//! This binary connects to the motord command socket (and, unless disabled,
//! its telemetry socket), forwards typed lines as protocol commands and prints
//! everything the daemon sends back.

use std::time::Duration;

use async_std::future::timeout;
use async_std::io::{self, BufReadExt, BufReader, WriteExt};
use async_std::net::TcpStream;
use async_std::task::{self, JoinHandle};
use clap::Parser;
use futures::StreamExt;

/// Default daemon host
const HOST_DEFAULT: &str = "127.0.0.1";
/// Default command port
const PORT_DEFAULT: u16 = 12345;
/// Default telemetry port
const TELEMETRY_PORT_DEFAULT: u16 = 12346;
/// How long to wait for the daemon to close the session after `quit`
const QUIT_GRACE: Duration = Duration::from_secs(3);

/// Motor Shell - controller CLI for motord
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon host
    #[arg(long, default_value = HOST_DEFAULT)]
    host: String,

    /// Command port
    #[arg(long, default_value_t = PORT_DEFAULT)]
    port: u16,

    /// Telemetry port
    #[arg(long, default_value_t = TELEMETRY_PORT_DEFAULT)]
    telemetry_port: u16,

    /// Do not open the telemetry socket (daemon runs with shared telemetry)
    #[arg(long)]
    no_telemetry: bool,
}

fn is_reading(line: &str) -> bool {
    line == "off" || line.parse::<f32>().is_ok()
}

/// Prints status lines until the daemon closes the command socket
async fn print_status(stream: TcpStream) {
    let mut lines = BufReader::new(stream).lines();
    while let Some(Ok(line)) = lines.next().await {
        if is_reading(&line) {
            if line != "off" {
                println!("📈 {}", line);
            }
        } else if line.contains(" failed") || line == "No command sent." {
            eprintln!("🔴 {}", line);
        } else {
            println!("🟢 {}", line);
        }
    }
    println!("🔌 Connection closed by daemon");
}

/// Prints speed readings; the `off` sentinel is not shown
async fn print_telemetry(stream: TcpStream) {
    let mut lines = BufReader::new(stream).lines();
    while let Some(Ok(line)) = lines.next().await {
        if line != "off" {
            println!("📈 Speed: {}", line);
        }
    }
}

struct MotorShell {
    address: String,
    writer: TcpStream,
    status: JoinHandle<()>,
    telemetry: Option<JoinHandle<()>>,
}

impl MotorShell {
    /// Connect to the daemon; the telemetry socket must follow the command socket
    async fn connect(args: &Args) -> Result<Self, Box<dyn std::error::Error>> {
        let address = format!("{}:{}", args.host, args.port);
        let stream = TcpStream::connect(&address).await?;

        let telemetry = if args.no_telemetry {
            None
        } else {
            let link = TcpStream::connect((args.host.as_str(), args.telemetry_port)).await?;
            Some(task::spawn(print_telemetry(link)))
        };

        Ok(MotorShell {
            address,
            writer: stream.clone(),
            status: task::spawn(print_status(stream)),
            telemetry,
        })
    }

    /// Show help information
    fn show_help(&self) {
        let help_text = r#"
🎮 Motor Shell Help
===================
Shell Commands:
  help            - Show this help message
  clear           - Clear the screen
  exit/q          - Send quit and leave the shell

Daemon Commands:
  RCW <speed> <ms>   - Rotate clockwise
  RCCW <speed> <ms>  - Rotate counter-clockwise
  ACC <value>        - Set acceleration (0 to 10)
  TSI / TSO          - Speed measurement on / off
  quit               - End the session
"#;
        println!("{}", help_text);
    }

    async fn send(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(format!("{}\n", line).as_bytes()).await
    }

    /// Run the main interactive command loop
    async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        println!("Connected to motord at {}", self.address);
        println!("Use 'help' for shell commands.");
        println!("{}", "─".repeat(80));

        let stdin = io::stdin();
        loop {
            print!("[{}]> ", self.address);
            std::io::Write::flush(&mut std::io::stdout())?;

            let mut input = String::new();
            if stdin.read_line(&mut input).await? == 0 {
                // End of input behaves like exit
                self.send("quit").await?;
                break;
            }

            let cmd = input.trim();
            if cmd.is_empty() {
                continue;
            }

            match cmd.to_lowercase().as_str() {
                "help" | "h" | "?" => {
                    self.show_help();
                    continue;
                }
                "clear" => {
                    print!("\x1B[2J\x1B[1;1H");
                    continue;
                }
                "exit" | "q" => {
                    self.send("quit").await?;
                    break;
                }
                _ => {}
            }

            if let Err(e) = self.send(cmd).await {
                eprintln!("🔴 Error sending command: {}", e);
                eprintln!("💡 The daemon may have closed the session");
                break;
            }
            if cmd == "quit" {
                break;
            }
        }

        if timeout(QUIT_GRACE, self.status).await.is_err() {
            eprintln!("🔴 Daemon did not close the session");
        }
        if let Some(telemetry) = self.telemetry {
            let _ = timeout(QUIT_GRACE, telemetry).await;
        }
        Ok(())
    }
}

#[async_std::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let shell = match MotorShell::connect(&args).await {
        Ok(shell) => shell,
        Err(e) => {
            eprintln!("🔴 Connection failed: {}", e);
            eprintln!(
                "💡 Make sure motord is running and accessible at {}:{}",
                args.host, args.port
            );
            std::process::exit(1);
        }
    };

    shell.run().await
}
