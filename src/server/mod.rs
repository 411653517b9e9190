use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use rayon::ThreadPoolBuilder;

pub mod api;
pub mod routes;

pub use api::AppContext;

/// Accepts connections and dispatches each onto a worker pool so requests
/// are handled in parallel. With `workers == 0` the global Rayon pool (all
/// cores) takes them.
pub fn run_server(ctx: Arc<AppContext>) -> std::io::Result<()> {
    let listener = TcpListener::bind(&ctx.settings.bind_addr)?;
    log::info!("arena server listening on http://{}", ctx.settings.bind_addr);

    let pool = match ctx.settings.workers {
        0 => None,
        n => Some(
            ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .expect("worker thread pool"),
        ),
    };

    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                let ctx = Arc::clone(&ctx);
                let task = move || {
                    if let Err(err) = handle_connection(&ctx, &mut stream) {
                        log::error!("request error: {err}");
                    }
                };
                match &pool {
                    Some(pool) => pool.spawn(task),
                    None => rayon::spawn(task),
                }
            }
            Err(err) => log::error!("connection failed: {err}"),
        }
    }

    Ok(())
}

fn handle_connection(ctx: &AppContext, stream: &mut TcpStream) -> std::io::Result<()> {
    let mut buffer = [0_u8; 16_384];
    let bytes_read = stream.read(&mut buffer)?;
    if bytes_read == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..bytes_read]);
    let mut lines = request.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut request_parts = request_line.split_whitespace();
    let method = request_parts.next().unwrap_or("GET");
    let path = request_parts.next().unwrap_or("/");

    let body = request
        .split("\r\n\r\n")
        .nth(1)
        .or_else(|| request.split("\n\n").nth(1))
        .unwrap_or("");

    let response = routes::route_request(ctx, method, path, body).to_http_string();
    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}
