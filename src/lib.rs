//! # GFP (GATT Fragment Protocol)
//!
//! BLE GATT 채널 위 메시지 분할/재조립 전송 프로토콜
//!
//! ## 핵심 특징
//! - **프래그먼트 분할**: 임의 크기 payload를 MTU 크기 조각으로 분할
//! - **태그 프레임**: DATA / END / CANCEL 종류 태그로 마커와 데이터 구분
//! - **멀티플렉싱**: 여러 idle 채널로 같은 메시지를 동시에 전송
//! - **쓰기 타임아웃**: 응답 없는 쓰기는 설정된 시간 후 실패 처리
//! - **무결성 검사**: END 마커에 전체 payload CRC32 포함
//! - **단일 소유 세션**: 피어별 상태는 하나의 tokio 태스크만 변경

pub mod codec;
pub mod config;
pub mod error;
pub mod hub;
pub mod pool;
pub mod reassembly;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod task;
pub mod transport;

pub use codec::{Frame, FrameKind};
pub use config::Config;
pub use error::{Error, Result};
pub use hub::SessionHub;
pub use pool::{ChannelInfo, ChannelPool};
pub use reassembly::{FeedOutcome, ReassemblyBuffer};
pub use scheduler::{FrameWrite, SendScheduler};
pub use session::{spawn_session, MessageReceiver, PeerSession, PendingSend, SessionHandle};
pub use stats::SessionStats;
pub use task::{Completion, SendTask, TaskId};
pub use transport::{MemoryLink, Transport, WriteAck};

/// 피어 식별자
pub type PeerId = u64;

/// 채널 (GATT characteristic) 식별자
pub type ChannelId = u16;

/// BLE 기본 ATT MTU (바이트)
pub const DEFAULT_MTU: usize = 23;

/// ATT Write 헤더 크기 (opcode + handle)
pub const ATT_HEADER_SIZE: usize = 3;
