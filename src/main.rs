use color_eyre::{eyre::eyre, Result};
use padlink::bridge::gamepad::GamepadBridgeHandle;
use padlink::config::Settings;
use padlink::device::{device_tag, DeviceInfo};
use padlink::protocol::HostReply;
use padlink::session::{Transport, TransportEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = Settings::load_or_create()?;
    info!("Using signaler {}", settings.signaler_url);

    let device_info = DeviceInfo::collect();
    let tag = device_tag(&device_info, &settings.device_slug);
    info!("Device tag: {}", tag);

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let transport = Transport::spawn(settings.signaler_url.clone(), tag, device_info, event_tx);

    transport
        .connect()
        .await
        .map_err(|e| eyre!("Failed to connect: {}", e))?;

    // Bridge a local gamepad when one is available; without one the
    // client still connects and shows host traffic.
    match GamepadBridgeHandle::spawn(Some(settings.bridge.clone()), transport.clone()) {
        Ok(_bridge) => info!("Gamepad bridge running"),
        Err(e) => warn!("Gamepad bridge unavailable: {}", e),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                transport.disconnect();
                break;
            }
            event = event_rx.recv() => match event {
                Some(TransportEvent::Connected) => info!("Controller channel open"),
                Some(TransportEvent::Closed) => {
                    info!("Session closed");
                    break;
                }
                Some(TransportEvent::Message(value)) => report_host_message(&value),
                None => break,
            }
        }
    }

    Ok(())
}

fn report_host_message(value: &serde_json::Value) {
    let Some(reply) = HostReply::from_value(value) else {
        debug!("Host message: {}", value);
        return;
    };
    if let Some(index) = reply.index {
        info!("Assigned controller slot {}", index);
    }
    if let Some(info) = &reply.info {
        info!("Host: {}", info);
    }
    if reply.ok == Some(false) {
        if let Some(message) = &reply.error {
            error!("Host error: {}", message);
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
