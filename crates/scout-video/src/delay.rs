use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use scout_types::ProcessedFrame;
use tokio::sync::mpsc;

/// 延迟缓冲：每帧在拍摄时刻 + delay 之后才放行，保持顺序
///
/// 用于补偿摄像头时钟与墙钟的抖动。delay 为 0 时直接旁路。
/// 输入流关闭后按原顺序立即放掉剩余帧。
pub fn delay_stream(
    delay: Duration,
    mut input: mpsc::Receiver<ProcessedFrame>,
) -> mpsc::Receiver<ProcessedFrame> {
    if delay.is_zero() {
        return input;
    }
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut queue: VecDeque<ProcessedFrame> = VecDeque::new();
        let mut input_open = true;
        loop {
            let due = queue.front().map(|frame| {
                let release_at = frame.created_time()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                let remaining = release_at - Utc::now();
                remaining.to_std().unwrap_or(Duration::ZERO)
            });
            match (due, input_open) {
                (Some(wait), true) => {
                    tokio::select! {
                        incoming = input.recv() => match incoming {
                            Some(frame) => queue.push_back(frame),
                            None => input_open = false,
                        },
                        _ = tokio::time::sleep(wait) => {
                            if let Some(frame) = queue.pop_front() {
                                if tx.send(frame).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
                (Some(_), false) => {
                    // 输入已关闭，按顺序放掉剩余帧
                    while let Some(frame) = queue.pop_front() {
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                }
                (None, true) => match input.recv().await {
                    Some(frame) => queue.push_back(frame),
                    None => input_open = false,
                },
                (None, false) => return,
            }
        }
    });
    rx
}
