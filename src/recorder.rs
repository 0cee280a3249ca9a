// ===============================
// src/recorder.rs
// ===============================
//
// JSONL recorder untuk likuidasi yang lolos filter tabel:
// - Tulis setiap record ke file .jsonl (append).
// - Bufer dengan BufWriter agar hemat syscall.
// - Flush periodik tiap 1s dan/atau tiap 1000 record.
// - Otomatis membuat parent directory jika belum ada.
// - Jika tulis gagal, coba reopen file dan lanjut.
//
// ENV: set `RECORD_FILE=/path/to/liquidations.jsonl` agar aktif (lihat main.rs).
// Audit log only, nothing is read back at startup.
//
use std::path::Path;

use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::LiquidationRecord;

const FLUSH_EVERY_N_RECORDS: u32 = 1000;

async fn open_writer(path: &str) -> std::io::Result<BufWriter<File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<File>, line: &[u8]) -> std::io::Result<()> {
    writer.write_all(line).await?;
    writer.write_all(b"\n").await
}

pub async fn run(mut rx: mpsc::Receiver<LiquidationRecord>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, recorder disabled");
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_rec = rx.recv() => {
                let Some(rec) = maybe_rec else {
                    // Channel closed: flush dan keluar
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                let line = match serde_json::to_string(&rec) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip record");
                        continue;
                    }
                };

                if let Err(e) = write_line(&mut writer, line.as_bytes()).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    writer = match open_writer(&path).await {
                        Ok(w) => w,
                        Err(e2) => {
                            error!(?e2, %path, "recorder: reopen failed, recorder stopped");
                            return;
                        }
                    };
                    // coba lagi sekali setelah reopen
                    if let Err(e2) = write_line(&mut writer, line.as_bytes()).await {
                        error!(?e2, "recorder: write failed again after reopen, drop record");
                        continue;
                    }
                }

                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_RECORDS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Recommendation, Side};

    fn record(qty: f64) -> LiquidationRecord {
        LiquidationRecord {
            timestamp: "2025-03-01 12:00:00".into(),
            symbol: "XRPUSDT".into(),
            side: Side::Sell,
            price: 0.5,
            quantity: qty,
            notional_usd: 0.5 * qty,
            ai_recommendation: Recommendation::Sell,
            confidence: 85,
        }
    }

    #[tokio::test]
    async fn writes_one_json_line_per_record() {
        let dir = std::env::temp_dir().join(format!("liq_signal_rec_{}", std::process::id()));
        let path = dir.join("nested").join("liq.jsonl");
        let path_str = path.to_string_lossy().to_string();
        let _ = std::fs::remove_dir_all(&dir);

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run(rx, path_str.clone()));
        tx.send(record(20_000.0)).await.unwrap();
        tx.send(record(30_000.0)).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<LiquidationRecord> =
            body.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines, vec![record(20_000.0), record(30_000.0)]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
