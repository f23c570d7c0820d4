//! 전송 통계

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::ChannelId;

/// 송신 카운터 (스케줄러가 갱신)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendStats {
    /// 전송한 DATA 프레임 수
    pub fragments_sent: u64,

    /// 전송한 payload 바이트
    pub payload_bytes_sent: u64,

    /// 전송한 END / CANCEL 마커 수
    pub markers_sent: u64,

    /// 성공 완료된 태스크 수
    pub tasks_completed: u64,

    /// 쓰기 실패 / 타임아웃으로 실패한 태스크 수
    pub tasks_failed: u64,

    /// 취소된 태스크 수
    pub tasks_cancelled: u64,

    /// 연결 끊김으로 중단된 태스크 수
    pub tasks_interrupted: u64,

    /// 쓰기 에러 수
    pub write_errors: u64,

    /// 쓰기 타임아웃 수
    pub write_timeouts: u64,
}

/// 수신 카운터 (재조립 버퍼가 갱신)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// 수신한 프레임 수
    pub frames_received: u64,

    /// 수신한 payload 바이트 (완료 메시지 기준)
    pub bytes_received: u64,

    /// 완료된 메시지 수
    pub messages_received: u64,

    /// CANCEL로 버려진 메시지 수
    pub messages_cancelled: u64,

    /// 손상 (시퀀스/CRC/크기/형식)으로 버려진 메시지 수
    pub messages_discarded: u64,
}

/// 쓰기 응답 기록
#[derive(Debug, Clone, Copy)]
struct WriteSample {
    acked_at: Instant,
    latency: Duration,
    size: usize,
}

/// 채널별 통계
#[derive(Debug, Clone)]
pub struct ChannelStats {
    /// 채널 ID
    pub channel: ChannelId,

    /// 최근 응답 기록
    samples: VecDeque<WriteSample>,

    /// 윈도우 크기
    window_size: usize,

    /// 총 응답된 쓰기 수
    pub total_writes: u64,

    /// 총 응답된 바이트
    pub total_bytes: u64,

    /// 실패한 쓰기 수
    pub failed_writes: u64,
}

impl ChannelStats {
    pub fn new(channel: ChannelId, window_size: usize) -> Self {
        Self {
            channel,
            samples: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            total_writes: 0,
            total_bytes: 0,
            failed_writes: 0,
        }
    }

    /// 쓰기 응답 기록
    pub fn record_ack(&mut self, size: usize, latency: Duration) {
        if self.samples.len() >= self.window_size {
            self.samples.pop_front();
        }

        self.samples.push_back(WriteSample {
            acked_at: Instant::now(),
            latency,
            size,
        });

        self.total_writes += 1;
        self.total_bytes += size as u64;
    }

    /// 실패 기록
    pub fn record_failure(&mut self) {
        self.failed_writes += 1;
    }

    /// 평균 쓰기 지연
    pub fn average_latency(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().map(|s| s.latency).sum();
        Some(total / self.samples.len() as u32)
    }

    /// 바이트 처리율 계산 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }

        let duration = last.acked_at.duration_since(first.acked_at);
        if duration.is_zero() {
            return 0.0;
        }

        let total_size: usize = self.samples.iter().skip(1).map(|s| s.size).sum();
        total_size as f64 / duration.as_secs_f64()
    }

    /// 실패율
    pub fn failure_rate(&self) -> f64 {
        let total = self.total_writes + self.failed_writes;
        if total == 0 {
            return 0.0;
        }
        self.failed_writes as f64 / total as f64
    }

    /// 다른 세션의 같은 채널 ID 통계 합산 (윈도우는 최근 응답 순으로 유지)
    pub fn merge(&mut self, other: &ChannelStats) {
        self.total_writes += other.total_writes;
        self.total_bytes += other.total_bytes;
        self.failed_writes += other.failed_writes;

        let mut samples: Vec<WriteSample> =
            self.samples.drain(..).chain(other.samples.iter().cloned()).collect();
        samples.sort_by_key(|s| s.acked_at);
        let skip = samples.len().saturating_sub(self.window_size);
        self.samples.extend(samples.into_iter().skip(skip));
    }
}

/// 세션 전체 통계
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 송신 카운터
    pub send: SendStats,

    /// 수신 카운터
    pub receive: ReceiveStats,

    /// 채널별 통계
    pub channels: BTreeMap<ChannelId, ChannelStats>,

    /// 대기 중 태스크 수
    pub queued_tasks: usize,

    /// 현재 협상된 MTU
    pub mtu: usize,
}

impl SessionStats {
    pub fn new(mtu: usize) -> Self {
        Self {
            start_time: Instant::now(),
            send: SendStats::default(),
            receive: ReceiveStats::default(),
            channels: BTreeMap::new(),
            queued_tasks: 0,
            mtu,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 채널 통계 (없으면 생성)
    pub fn channel_mut(&mut self, channel: ChannelId, window_size: usize) -> &mut ChannelStats {
        self.channels
            .entry(channel)
            .or_insert_with(|| ChannelStats::new(channel, window_size))
    }

    /// 송신 처리율 (payload bytes/sec)
    pub fn send_throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.send.payload_bytes_sent as f64 / elapsed
    }

    /// 채널별 쓰기 비율 (멀티플렉싱 분포)
    pub fn channel_ratios(&self) -> Vec<(ChannelId, f64)> {
        let total: u64 = self.channels.values().map(|s| s.total_writes).sum();
        if total == 0 {
            let count = self.channels.len().max(1);
            return self
                .channels
                .keys()
                .map(|&id| (id, 1.0 / count as f64))
                .collect();
        }

        self.channels
            .values()
            .map(|s| (s.channel, s.total_writes as f64 / total as f64))
            .collect()
    }

    /// 여러 세션 통계 합산 (허브용)
    pub fn merge(&mut self, other: &SessionStats) {
        self.send.fragments_sent += other.send.fragments_sent;
        self.send.payload_bytes_sent += other.send.payload_bytes_sent;
        self.send.markers_sent += other.send.markers_sent;
        self.send.tasks_completed += other.send.tasks_completed;
        self.send.tasks_failed += other.send.tasks_failed;
        self.send.tasks_cancelled += other.send.tasks_cancelled;
        self.send.tasks_interrupted += other.send.tasks_interrupted;
        self.send.write_errors += other.send.write_errors;
        self.send.write_timeouts += other.send.write_timeouts;

        self.receive.frames_received += other.receive.frames_received;
        self.receive.bytes_received += other.receive.bytes_received;
        self.receive.messages_received += other.receive.messages_received;
        self.receive.messages_cancelled += other.receive.messages_cancelled;
        self.receive.messages_discarded += other.receive.messages_discarded;

        for (&id, channel) in &other.channels {
            match self.channels.get_mut(&id) {
                Some(existing) => existing.merge(channel),
                None => {
                    self.channels.insert(id, channel.clone());
                }
            }
        }

        // 여러 세션을 합칠 때는 가장 작은 MTU
        self.mtu = self.mtu.min(other.mtu);
        self.queued_tasks += other.queued_tasks;
        if other.start_time < self.start_time {
            self.start_time = other.start_time;
        }
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Sent: {} msgs / {} frags / {} bytes | Recv: {} msgs / {} bytes | Failed: {} | Cancelled: {} | Timeouts: {} | Discarded: {}",
            self.elapsed().as_secs_f64(),
            self.send.tasks_completed,
            self.send.fragments_sent,
            self.send.payload_bytes_sent,
            self.receive.messages_received,
            self.receive.bytes_received,
            self.send.tasks_failed,
            self.send.tasks_cancelled,
            self.send.write_timeouts,
            self.receive.messages_discarded,
        )
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MTU)
    }
}
