//! 재조립 버퍼
//!
//! 피어 하나의 수신 프레임 스트림을 완성된 메시지로 복원.
//!
//! ```text
//! Empty ──DATA(0)──▶ Accumulating ──END──▶ Empty (메시지 전달)
//!   ▲                    │  │
//!   │                    │  └─CANCEL──▶ Empty (폐기)
//!   │            gap/CRC/overflow
//!   │                    ▼
//!   └──END/CANCEL── Discarding ──DATA(0)──▶ Accumulating
//! ```
//!
//! 손상된 스트림은 송신측에 알리지 않고 버림 (재전송 요청 없음).

use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::codec::Frame;
use crate::stats::ReceiveStats;
use crate::Error;

/// 재조립 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// 진행 중인 메시지 없음
    Empty,

    /// DATA 누적 중
    Accumulating,

    /// 손상된 메시지의 나머지 프레임 무시 중
    Discarding,
}

/// 프레임 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// 전달할 메시지 없음
    Pending,

    /// 메시지 완성
    Complete(Bytes),

    /// CANCEL 수신으로 폐기
    Cancelled,

    /// 손상으로 폐기
    Discarded(Error),
}

/// 피어별 재조립 버퍼
#[derive(Debug)]
pub struct ReassemblyBuffer {
    state: ReassemblyState,
    buffer: BytesMut,

    /// 다음에 기대하는 DATA 시퀀스 (= 지금까지 받은 프래그먼트 수)
    next_seq: u16,

    max_message_size: usize,
    started_at: Option<Instant>,
    stats: ReceiveStats,
}

impl ReassemblyBuffer {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            state: ReassemblyState::Empty,
            buffer: BytesMut::new(),
            next_seq: 0,
            max_message_size,
            started_at: None,
            stats: ReceiveStats::default(),
        }
    }

    /// 수신 바이트 처리
    pub fn feed(&mut self, bytes: Bytes) -> FeedOutcome {
        self.stats.frames_received += 1;

        match Frame::decode(bytes) {
            Ok(frame) => self.feed_frame(frame),
            Err(e) => {
                if self.state == ReassemblyState::Accumulating {
                    self.discard(e)
                } else {
                    warn!("해석 불가 프레임 무시: {}", e);
                    self.stats.messages_discarded += 1;
                    FeedOutcome::Discarded(e)
                }
            }
        }
    }

    /// 디코딩된 프레임 처리
    pub fn feed_frame(&mut self, frame: Frame) -> FeedOutcome {
        match frame {
            Frame::Data { seq, payload } => self.on_data(seq, payload),
            Frame::End { count, crc32 } => self.on_end(count, crc32),
            Frame::Cancel => self.on_cancel(),
        }
    }

    fn on_data(&mut self, seq: u16, payload: Bytes) -> FeedOutcome {
        // 65536번째 프래그먼트도 seq 0: 기대 시퀀스가 0으로 돌아온 경우는 이어 붙임
        let wrapped = self.state == ReassemblyState::Accumulating && self.next_seq == 0;
        if seq == 0 && !wrapped {
            if self.state == ReassemblyState::Accumulating {
                warn!(
                    "END 없이 새 메시지 시작: {} bytes 폐기",
                    self.buffer.len()
                );
                self.stats.messages_discarded += 1;
            }
            self.begin();
        }

        match self.state {
            ReassemblyState::Discarding => FeedOutcome::Pending,
            ReassemblyState::Empty => {
                let error = Error::SequenceGap {
                    expected: 0,
                    got: seq,
                };
                self.discard(error)
            }
            ReassemblyState::Accumulating => {
                if seq != self.next_seq {
                    let error = Error::SequenceGap {
                        expected: self.next_seq,
                        got: seq,
                    };
                    return self.discard(error);
                }
                if self.buffer.len() + payload.len() > self.max_message_size {
                    let error = Error::BufferOverflow {
                        max_size: self.max_message_size,
                    };
                    return self.discard(error);
                }

                self.buffer.extend_from_slice(&payload);
                self.next_seq = self.next_seq.wrapping_add(1);
                FeedOutcome::Pending
            }
        }
    }

    fn on_end(&mut self, count: u16, crc32: u32) -> FeedOutcome {
        match self.state {
            ReassemblyState::Discarding => {
                debug!("폐기 중인 메시지 종료");
                self.reset();
                FeedOutcome::Pending
            }
            ReassemblyState::Empty | ReassemblyState::Accumulating => {
                if count != self.next_seq {
                    return self.reject(Error::InvalidFrame("프래그먼트 수 불일치"));
                }

                let got = crc32fast::hash(&self.buffer);
                if got != crc32 {
                    return self.reject(Error::CrcMismatch {
                        expected: crc32,
                        got,
                    });
                }

                let message = self.buffer.split().freeze();
                if let Some(started_at) = self.started_at {
                    debug!(
                        "메시지 완성: {} bytes, {} 프래그먼트, {:.2}ms",
                        message.len(),
                        count,
                        started_at.elapsed().as_secs_f64() * 1000.0
                    );
                }

                self.stats.messages_received += 1;
                self.stats.bytes_received += message.len() as u64;
                self.reset();
                FeedOutcome::Complete(message)
            }
        }
    }

    fn on_cancel(&mut self) -> FeedOutcome {
        if self.state == ReassemblyState::Accumulating {
            debug!("CANCEL 수신: {} bytes 폐기", self.buffer.len());
            self.stats.messages_cancelled += 1;
        }
        self.reset();
        FeedOutcome::Cancelled
    }

    fn begin(&mut self) {
        self.buffer.clear();
        self.next_seq = 0;
        self.state = ReassemblyState::Accumulating;
        self.started_at = Some(Instant::now());
    }

    /// 진행 중 메시지를 버리고 END / CANCEL까지 무시
    fn discard(&mut self, error: Error) -> FeedOutcome {
        warn!("수신 메시지 폐기: {}", error);
        self.stats.messages_discarded += 1;
        self.buffer.clear();
        self.state = ReassemblyState::Discarding;
        FeedOutcome::Discarded(error)
    }

    /// END 검증 실패: 버리고 Empty로
    fn reject(&mut self, error: Error) -> FeedOutcome {
        warn!("수신 메시지 폐기: {}", error);
        self.stats.messages_discarded += 1;
        self.reset();
        FeedOutcome::Discarded(error)
    }

    /// 초기 상태로 (연결 끊김 시에도 호출)
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.next_seq = 0;
        self.state = ReassemblyState::Empty;
        self.started_at = None;
    }

    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    pub fn is_accumulating(&self) -> bool {
        self.state == ReassemblyState::Accumulating
    }

    /// 누적된 바이트 수
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn stats(&self) -> &ReceiveStats {
        &self.stats
    }
}
