//! End-to-end: simulated panel -> link -> relay -> mixer -> memory backend.

use std::time::Duration;

use knobmix_audio::MemoryBackend;
use knobmix_core::RelayBuffer;
use knobmix_daemon::{Link, LinkConfig, MemoryPorts, Mixer, MixerConfig, ShutdownHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

async fn read_line(device: &mut DuplexStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        device.read_exact(&mut byte).await.unwrap();
        if byte[0] == b'\n' {
            return String::from_utf8(line).unwrap();
        }
        line.push(byte[0]);
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn link_config() -> LinkConfig {
    LinkConfig::default()
        .with_handshake_timeout(Duration::from_millis(200))
        .with_heartbeat_timeout(Duration::from_secs(2))
        .with_reconnect_delay(Duration::from_millis(20))
        .with_search_backoff(Duration::from_millis(20))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_reach_audio_backend() {
    let ports = MemoryPorts::new();
    let mut device = ports.plug("sim0");

    let backend = MemoryBackend::new().with_session("vlc", Some(4242), 1.0);
    let audio = backend.clone();

    let mixer_config = MixerConfig::new(3)
        .with_poll_interval(Duration::from_millis(5))
        .with_endpoints(["master", "mic", "VLC"]);
    let relay = RelayBuffer::shared(mixer_config.relay_capacity);
    let shutdown = ShutdownHandle::new();

    let link = Link::new(ports.clone(), link_config(), relay.clone(), shutdown.clone());
    let mixer = Mixer::new(&mixer_config, relay, backend).unwrap();

    let link_task = tokio::spawn(link.run());
    let mixer_task = {
        let shutdown = shutdown.clone();
        tokio::task::spawn_blocking(move || mixer.run(&shutdown))
    };

    device.write_all(b"KNOBMIX:HELLO\n").await.unwrap();
    assert_eq!(read_line(&mut device).await, "KNOBMIX:READY");

    device.write_all(b"1023|0|512\r").await.unwrap();
    wait_for(|| audio.master_volume().is_some()).await;

    assert_eq!(audio.master_volume(), Some(1.0));
    assert!(audio.is_microphone_muted());
    let vlc = audio.session("vlc").unwrap();
    assert!((vlc.volume - 512.0 / 1023.0).abs() < 1e-4);
    assert!(!vlc.muted);

    device.write_all(b"KNOBMIX:PING\n").await.unwrap();
    assert_eq!(read_line(&mut device).await, "KNOBMIX:PING");

    device.write_all(b"0|300|0\r").await.unwrap();
    wait_for(|| audio.session("vlc").is_some_and(|s| s.muted)).await;
    assert_eq!(audio.master_volume(), Some(0.0));

    shutdown.trigger();
    let link_stats = tokio::time::timeout(Duration::from_secs(1), link_task)
        .await
        .unwrap()
        .unwrap();
    let mixer_stats = tokio::time::timeout(Duration::from_secs(1), mixer_task)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(link_stats.links_established, 1);
    assert_eq!(link_stats.lines_relayed, 2);
    assert_eq!(link_stats.heartbeats, 1);
    assert_eq!(mixer_stats.frames_applied, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn link_recovers_after_replug() {
    let ports = MemoryPorts::new();
    let mut first = ports.plug("sim0");
    let relay = RelayBuffer::shared(8);
    let shutdown = ShutdownHandle::new();

    let link = Link::new(ports.clone(), link_config(), relay.clone(), shutdown.clone());
    let link_task = tokio::spawn(link.run());

    first.write_all(b"KNOBMIX:HELLO\n").await.unwrap();
    assert_eq!(read_line(&mut first).await, "KNOBMIX:READY");
    drop(first);

    let mut second = ports.plug("sim0");
    second.write_all(b"KNOBMIX:HELLO\n").await.unwrap();
    assert_eq!(read_line(&mut second).await, "KNOBMIX:READY");

    second.write_all(b"7|7|7\r").await.unwrap();
    wait_for(|| !relay.is_empty()).await;
    assert_eq!(relay.pop().as_deref(), Some("7|7|7"));

    shutdown.trigger();
    let stats = tokio::time::timeout(Duration::from_secs(1), link_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.links_established, 2);
    assert_eq!(stats.disconnects, 1);
    assert_eq!(ports.opened(), vec!["sim0", "sim0"]);
}
