//! 에러 타입 정의

use thiserror::Error;

use crate::{ChannelId, PeerId, TaskId};

/// GFP 프로토콜 에러 타입
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("사용 가능한 데이터 채널 없음")]
    NoChannelsAvailable,

    #[error("등록되지 않은 채널: {channel}")]
    UnknownChannel { channel: ChannelId },

    #[error("오프셋 범위 초과: offset={offset}, advance={advance}, len={len}")]
    Range {
        offset: usize,
        advance: usize,
        len: usize,
    },

    #[error("피어 연결 끊김으로 전송 중단")]
    Interrupted,

    #[error("전송 쓰기 실패: channel={channel}, {reason}")]
    TransportWrite { channel: ChannelId, reason: String },

    #[error("쓰기 응답 타임아웃: channel={channel}, {timeout_ms}ms")]
    WriteTimeout { channel: ChannelId, timeout_ms: u64 },

    #[error("전송 취소됨: task_id={task_id}")]
    Cancelled { task_id: TaskId },

    #[error("유효하지 않은 프레임: {0}")]
    InvalidFrame(&'static str),

    #[error("CRC 불일치: expected {expected:08X}, got {got:08X}")]
    CrcMismatch { expected: u32, got: u32 },

    #[error("시퀀스 불일치: expected {expected}, got {got}")]
    SequenceGap { expected: u16, got: u16 },

    #[error("버퍼 오버플로우: 최대 크기 {max_size} 초과")]
    BufferOverflow { max_size: usize },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("세션 종료됨")]
    SessionClosed,

    #[error("알 수 없는 피어: {peer}")]
    UnknownPeer { peer: PeerId },
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
