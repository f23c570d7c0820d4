//! 프로토콜 설정

use std::time::Duration;

use crate::codec::FRAME_HEADER_SIZE;
use crate::{Error, Result, ATT_HEADER_SIZE, DEFAULT_MTU};

/// GFP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 협상 전 기본 ATT MTU (바이트)
    /// 협상된 값이 오면 세션이 `on_mtu_changed`로 갱신
    pub default_mtu: usize,

    /// 쓰기 응답 대기 타임아웃 (밀리초)
    /// 0이면 타임아웃 없음 (연결 끊김 감지에만 의존)
    pub write_timeout_ms: u64,

    /// 타임아웃 검사 주기 (밀리초)
    pub tick_interval_ms: u64,

    /// 수신 메시지 최대 크기 (바이트)
    pub max_message_size: usize,

    /// 세션 명령 큐 크기
    pub command_queue_size: usize,

    /// 완료 메시지 큐 크기
    pub message_queue_size: usize,

    /// 채널별 통계 윈도우 (쓰기 수)
    pub stats_window_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_mtu: DEFAULT_MTU,
            write_timeout_ms: 5000,            // 5초
            tick_interval_ms: 100,             // 100ms
            max_message_size: 1024 * 1024,     // 1MB
            command_queue_size: 1000,
            message_queue_size: 100,
            stats_window_size: 100,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// MTU에서 프래그먼트당 데이터 크기 계산
    pub fn fragment_size_for_mtu(mtu: usize) -> usize {
        mtu.saturating_sub(ATT_HEADER_SIZE + FRAME_HEADER_SIZE)
    }

    /// 기본 MTU 기준 프래그먼트 크기
    pub fn max_fragment_size(&self) -> usize {
        Self::fragment_size_for_mtu(self.default_mtu)
    }

    /// 타임아웃 (비활성화 시 None)
    pub fn write_timeout(&self) -> Option<Duration> {
        if self.write_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.write_timeout_ms))
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_fragment_size() == 0 {
            return Err(Error::InvalidConfig(format!(
                "MTU {}는 헤더({}바이트)보다 커야 함",
                self.default_mtu,
                ATT_HEADER_SIZE + FRAME_HEADER_SIZE
            )));
        }
        if self.command_queue_size == 0 || self.message_queue_size == 0 {
            return Err(Error::InvalidConfig("큐 크기는 0일 수 없음".into()));
        }
        if self.max_message_size == 0 {
            return Err(Error::InvalidConfig("max_message_size는 0일 수 없음".into()));
        }
        Ok(())
    }

    /// BLE 4.x 기본 설정 (MTU 23)
    pub fn ble4() -> Self {
        Self::default()
    }

    /// BLE 5.x 설정 (DLE, MTU 247)
    pub fn ble5() -> Self {
        Self {
            default_mtu: 247,
            write_timeout_ms: 3000,
            max_message_size: 8 * 1024 * 1024, // 8MB
            stats_window_size: 200,
            ..Self::default()
        }
    }

    /// 저지연 설정 (짧은 타임아웃, 잦은 검사)
    pub fn low_latency() -> Self {
        Self {
            default_mtu: 185,
            write_timeout_ms: 500,
            tick_interval_ms: 20,
            command_queue_size: 256,
            ..Self::default()
        }
    }
}
