//! Drive a running instance with upload, pair, vote and top traffic

use anyhow::{Context, Result, bail};
use clap::Parser;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use reqwest::{Client, multipart};
use serde_json::{Value, json};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

#[derive(Parser, Clone)]
#[command(name = "loadtest")]
#[command(about = "Load test a picrank instance")]
struct Cli {
    /// Base URL of the service
    #[arg(short, long, default_value = "http://localhost:8001")]
    address: String,

    /// How long to keep sending requests
    #[arg(short, long, default_value = "30s", value_parser = humantime::parse_duration)]
    duration: Duration,

    /// Concurrent clients
    #[arg(short, long, default_value_t = 10)]
    connections: usize,

    /// Per-request timeout
    #[arg(short, long, default_value = "5s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Images per uploaded album
    #[arg(short, long, default_value_t = 5)]
    images: usize,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn record(&self, ok: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn png(seed: usize) -> Result<Vec<u8>> {
    let shade = (seed * 47 % 256) as u8;
    let img = ImageBuffer::from_fn(32, 32, |x, y| Rgb([shade, (x * 8) as u8, (y * 8) as u8]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

async fn upload(client: &Client, base: &str, images: usize) -> Result<String> {
    let mut form = multipart::Form::new().text("duration", "1h");
    for i in 0..images {
        let part = multipart::Part::bytes(png(i)?)
            .file_name(format!("image{i}.png"))
            .mime_str("image/png")?;
        form = form.part("images", part);
    }

    let response = client
        .post(format!("{base}/api/albums/"))
        .multipart(form)
        .send()
        .await
        .context("uploading album")?;
    if !response.status().is_success() {
        bail!("upload answered {}", response.status());
    }
    let body: Value = response.json().await?;
    body["album"]["id"]
        .as_str()
        .map(str::to_string)
        .context("upload response without album id")
}

async fn round(client: &Client, base: &str, album: &str, n: u64, counters: &Counters) {
    let pair = client
        .get(format!("{base}/api/albums/{album}/pair/"))
        .send()
        .await;
    let pair: Option<Value> = match pair {
        Ok(response) if response.status().is_success() => response.json().await.ok(),
        _ => None,
    };
    counters.record(pair.is_some());
    let Some(pair) = pair else {
        return;
    };

    let vote = json!({"album": {
        "imgFrom": {"token": pair["album"]["img1"]["token"]},
        "imgTo": {"token": pair["album"]["img2"]["token"]},
    }});
    let voted = client
        .patch(format!("{base}/api/albums/{album}/vote/"))
        .json(&vote)
        .send()
        .await
        .is_ok_and(|r| r.status().is_success());
    counters.record(voted);

    let path = if n % 2 == 0 { "top" } else { "status" };
    let read = client
        .get(format!("{base}/api/albums/{album}/{path}/"))
        .send()
        .await
        .is_ok_and(|r| r.status().is_success());
    counters.record(read);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let base = cli.address.trim_end_matches('/').to_string();
    let client = Client::builder().timeout(cli.timeout).build()?;

    let album = upload(&client, &base, cli.images.max(2)).await?;
    println!("uploaded album {album}, running {} clients for {:?}", cli.connections, cli.duration);

    let counters = Arc::new(Counters::default());
    let deadline = Instant::now() + cli.duration;
    let mut clients = JoinSet::new();
    for _ in 0..cli.connections {
        let client = client.clone();
        let base = base.clone();
        let album = album.clone();
        let counters = counters.clone();
        clients.spawn(async move {
            let mut n = 0u64;
            while Instant::now() < deadline {
                round(&client, &base, &album, n, &counters).await;
                n += 1;
            }
        });
    }
    while clients.join_next().await.is_some() {}

    let requests = counters.requests.load(Ordering::Relaxed);
    let errors = counters.errors.load(Ordering::Relaxed);
    let seconds = cli.duration.as_secs_f64().max(f64::EPSILON);
    println!("requests: {requests}");
    println!("errors:   {errors}");
    println!("rate:     {:.1} req/s", requests as f64 / seconds);
    Ok(())
}
