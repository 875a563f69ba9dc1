// ===============================
// src/recorder.rs
// ===============================
//
// Jejak audit JSONL untuk hasil sinkronisasi:
// - Satu baris JSON per Event (balance / trade / trade_failed / run).
// - BufWriter + flush tiap 1s, dan saat channel ditutup.
// - Parent directory dibuat otomatis.
//
// ENV: `RECORD_FILE=/path/to/sync.jsonl` agar aktif (lihat main.rs).
//
use std::path::Path;

use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;

async fn open_writer(path: &str) -> std::io::Result<BufWriter<fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, recording disabled");
            // kosongkan channel agar pengirim tidak tertahan
            while rx.recv().await.is_some() {}
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                let mut line = match serde_json::to_string(&ev) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    error!(?e, "recorder: write failed, reopening");
                    match open_writer(&path).await {
                        Ok(w) => {
                            writer = w;
                            if let Err(e2) = writer.write_all(line.as_bytes()).await {
                                error!(?e2, "recorder: write failed again after reopen, drop event");
                            }
                        }
                        Err(e2) => error!(?e2, "recorder: reopen failed, drop event"),
                    }
                }
            }
            _ = tick.tick() => {
                let _ = writer.flush().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SyncReport, UpsertAction};

    #[tokio::test]
    async fn writes_one_line_per_event() {
        let dir = std::env::temp_dir().join(format!("bns-recorder-{}", std::process::id()));
        let path = dir.join("nested").join("sync.jsonl");
        let path_s = path.to_string_lossy().to_string();
        let _ = std::fs::remove_file(&path);

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(run(rx, path_s));

        tx.send(Event::Trade {
            ts_ms: 1,
            key: "BTCUSDT-1000".into(),
            action: UpsertAction::Created,
            page_id: "p1".into(),
        })
        .await
        .unwrap();
        tx.send(Event::Run { ts_ms: 2, report: SyncReport::default() }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "trade");
        assert_eq!(first["action"], "created");
        assert_eq!(first["key"], "BTCUSDT-1000");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
