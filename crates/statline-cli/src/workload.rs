use std::time::Duration;

use statline::Task;

/// Chunks each simulated worker splits its transfer into.
const CHUNKS: u64 = 16;
/// Pause between chunks, so rates and ETAs have something to estimate.
const CHUNK_PAUSE: Duration = Duration::from_millis(40);

/// Drive a simulated multi-worker transfer through the status engine:
/// one aggregating "transfer" task, one byte-reporting child per worker.
pub async fn run(root: &Task, workers: usize, bytes_per_worker: u64) {
    let transfer = root.subtask_with_progress("transfer");
    transfer.infof(format_args!(
        "moving {bytes_per_worker} bytes on each of {workers} workers"
    ));

    let mut handles = Vec::with_capacity(workers);
    for index in 0..workers {
        let file = transfer.subtask_with_progress(format!("file-{index}"));
        handles.push(tokio::spawn(async move {
            file.update(0, bytes_per_worker as i64);
            let chunk = (bytes_per_worker / CHUNKS).max(1) as i64;
            let mut moved = 0i64;
            while moved < bytes_per_worker as i64 {
                tokio::time::sleep(CHUNK_PAUSE).await;
                let step = chunk.min(bytes_per_worker as i64 - moved);
                file.update(step, 0);
                moved += step;
            }
            file.info("done");
            file.complete();
        }));
    }

    for handle in handles {
        // Worker panics would leave their tasks open; surface them here.
        handle.await.expect("transfer worker panicked");
    }
    transfer.complete();
}
