//! GFP 루프백 데모 - GATT Fragment Protocol
//!
//! 메모리 링크로 연결된 두 피어 세션 사이에서 메시지를 주고받음
//! - 여러 데이터 채널로 프래그먼트 멀티플렉싱
//! - 채널 쓰기 실패 주입으로 취소 / 재전송 흐름 확인
//!
//! 사용법:
//!   cargo run --release --bin gfp-loopback -- [OPTIONS]
//!
//! 예시:
//!   # 기본 (MTU 23, 채널 3개, 64KB 랜덤 메시지 4개)
//!   cargo run --release --bin gfp-loopback
//!
//!   # 파일 전송 후 저장
//!   cargo run --release --bin gfp-loopback -- --mtu 247 -f input.bin -o received.bin

use std::path::PathBuf;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::RngCore;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use gfp::transport::MemoryLink;
use gfp::{spawn_session, ChannelId, Config};

/// 데모 설정
struct LoopbackConfig {
    channels: u16,
    message_size: usize,
    count: usize,
    input_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    fail_channel: Option<ChannelId>,
    config: Config,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            channels: 3,
            message_size: 64 * 1024,
            count: 4,
            input_path: None,
            output_path: None,
            fail_channel: None,
            config: Config::default(),
        }
    }
}

fn parse_args() -> LoopbackConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = LoopbackConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--mtu" | "-m" => {
                if i + 1 < args.len() {
                    config.config.default_mtu = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--channels" | "-c" => {
                if i + 1 < args.len() {
                    config.channels = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--size" | "-s" => {
                if i + 1 < args.len() {
                    config.message_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--count" | "-n" => {
                if i + 1 < args.len() {
                    config.count = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    config.input_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    config.output_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--timeout" | "-t" => {
                if i + 1 < args.len() {
                    config.config.write_timeout_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--fail" => {
                if i + 1 < args.len() {
                    config.fail_channel = Some(args[i + 1].parse().expect("유효한 채널 ID 필요"));
                    i += 1;
                }
            }
            "--ble5" => {
                config.config = Config::ble5();
            }
            "--help" | "-h" => {
                println!(
                    r#"GFP Loopback - GATT Fragment Protocol 데모

메모리 링크로 연결된 두 세션 사이의 메시지 분할 / 재조립 전송

사용법:
  cargo run --release --bin gfp-loopback -- [OPTIONS]

옵션:
  -m, --mtu <BYTES>      ATT MTU (기본: 23)
  -c, --channels <N>     데이터 채널 수 (기본: 3)
  -s, --size <BYTES>     랜덤 메시지 크기 (기본: 65536)
  -n, --count <N>        메시지 수 (기본: 4)
  -f, --file <PATH>      랜덤 대신 파일 내용 전송 (메시지 1개)
  -o, --output <PATH>    마지막으로 받은 메시지 저장 경로
  -t, --timeout <MS>     쓰기 응답 타임아웃 (0 = 없음, 기본: 5000)
  --fail <CHANNEL>       해당 채널의 첫 쓰기를 실패로 응답
  --ble5                 BLE 5 프리셋 (MTU 247)
  -h, --help             이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let loopback = parse_args();
    loopback.config.validate()?;

    info!("GFP Loopback starting...");
    info!("  MTU: {} bytes", loopback.config.default_mtu);
    info!("  Fragment size: {} bytes", loopback.config.max_fragment_size());
    info!("  Channels: {}", loopback.channels);

    // 전송할 메시지 준비
    let payloads: Vec<Bytes> = match &loopback.input_path {
        Some(path) => {
            let data = tokio::fs::read(path).await?;
            info!("Loaded {} bytes from {:?}", data.len(), path);
            vec![Bytes::from(data)]
        }
        None => {
            let mut rng = rand::thread_rng();
            (0..loopback.count)
                .map(|_| {
                    let mut data = vec![0u8; loopback.message_size];
                    rng.fill_bytes(&mut data);
                    Bytes::from(data)
                })
                .collect()
        }
    };

    // 세션 구성: 각 세션의 PeerId는 상대 피어
    let (link_ab, wire_ab) = MemoryLink::new();
    let (link_ba, wire_ba) = MemoryLink::new();
    if let Some(channel) = loopback.fail_channel {
        link_ab.controller().fail_channel(channel, 1);
    }

    let (central, _central_messages) = spawn_session(2, loopback.config.clone(), link_ab)?;
    let (peripheral, mut messages) = spawn_session(1, loopback.config.clone(), link_ba)?;

    wire_ab.connect(central.clone(), peripheral.clone());
    wire_ba.connect(peripheral.clone(), central.clone());

    let channels: Vec<ChannelId> = (1..=loopback.channels).collect();
    central.channels_discovered(channels.clone()).await?;
    peripheral.channels_discovered(channels).await?;

    let start = Instant::now();
    let mut delivered = 0usize;
    let mut last_message = None;

    for (index, payload) in payloads.iter().enumerate() {
        let sent_at = Instant::now();

        if let Err(e) = central.send(payload.clone()).await {
            warn!("Message {} failed: {}", index, e);
            continue;
        }

        match tokio::time::timeout(Duration::from_secs(30), messages.recv()).await {
            Ok(Some((peer, message))) => {
                if message != *payload {
                    warn!("Message {} corrupted ({} bytes)", index, message.len());
                    continue;
                }
                info!(
                    "Message {} delivered from peer {}: {} bytes in {:.2}ms",
                    index,
                    peer,
                    message.len(),
                    sent_at.elapsed().as_secs_f64() * 1000.0
                );
                delivered += 1;
                last_message = Some(message);
            }
            Ok(None) => {
                warn!("Receiver closed");
                break;
            }
            Err(_) => {
                warn!("Message {} not received within 30s", index);
            }
        }
    }

    let elapsed = start.elapsed();
    let total_bytes: usize = payloads.iter().map(|p| p.len()).sum();

    info!("");
    info!("=== Loopback Complete ===");
    info!("Delivered: {}/{}", delivered, payloads.len());
    info!("Elapsed: {:.2}s", elapsed.as_secs_f64());
    if elapsed.as_secs_f64() > 0.0 {
        info!(
            "Throughput: {:.2} KB/s",
            total_bytes as f64 / elapsed.as_secs_f64() / 1024.0
        );
    }

    let central_stats = central.stats();
    info!("Central: {}", central_stats.summary());
    for (channel, ratio) in central_stats.channel_ratios() {
        info!("  Channel {}: {:.1}% of writes", channel, ratio * 100.0);
    }
    info!("Peripheral: {}", peripheral.stats().summary());

    if let (Some(path), Some(message)) = (&loopback.output_path, last_message) {
        tokio::fs::write(path, &message).await?;
        info!("Saved {} bytes to {:?}", message.len(), path);
    }

    central.stop().await;
    peripheral.stop().await;

    Ok(())
}
