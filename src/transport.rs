//! 전송 계층 경계
//!
//! 플랫폼 BLE 스택은 `Transport`를 구현해 프레임 쓰기를 수행하고,
//! 쓰기 응답은 세션의 `on_write_complete` 이벤트로 돌려줌.
//! `MemoryLink`는 두 세션을 메모리로 잇는 구현 (테스트 / 데모용).

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::SessionHandle;
use crate::{ChannelId, Error, PeerId, Result};

/// 쓰기 응답 (실패 시 전송 계층의 사유)
pub type WriteAck = std::result::Result<(), String>;

/// 프레임 쓰기 인터페이스
pub trait Transport: Send + 'static {
    /// 채널에 프레임 한 개 쓰기 요청
    ///
    /// 즉시 거부된 쓰기만 `Err`. 수락된 쓰기의 결과는 나중에 응답 이벤트로 전달.
    fn write_fragment(&mut self, peer: PeerId, channel: ChannelId, frame: Bytes) -> Result<()>;
}

/// 링크를 지나는 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub peer: PeerId,
    pub channel: ChannelId,
    pub frame: Bytes,
}

#[derive(Debug, Default)]
struct LinkState {
    /// 채널별 남은 실패 주입 횟수
    failures: HashMap<ChannelId, usize>,

    /// 응답 보류 (쓰기 멈춤 재현)
    stalled: bool,

    /// 쓰기 즉시 거부
    closed: bool,

    /// 전달된 프레임 수
    delivered: u64,
}

/// 링크 동작 제어
#[derive(Debug, Clone, Default)]
pub struct LinkController {
    state: Arc<Mutex<LinkState>>,
}

impl LinkController {
    /// 해당 채널의 다음 `count`번 쓰기를 실패로 응답
    pub fn fail_channel(&self, channel: ChannelId, count: usize) {
        *self.state.lock().failures.entry(channel).or_insert(0) += count;
    }

    /// 응답 보류 여부 설정
    pub fn set_stalled(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    /// 링크 닫기 (이후 쓰기는 즉시 거부)
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn delivered(&self) -> u64 {
        self.state.lock().delivered
    }

    /// 전달 기록, 응답 보류 여부 반환
    fn record_delivery(&self) -> bool {
        let mut state = self.state.lock();
        state.delivered += 1;
        state.stalled
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// 주입된 실패가 있으면 소비하고 true
    fn take_failure(&self, channel: ChannelId) -> bool {
        let mut state = self.state.lock();
        match state.failures.get_mut(&channel) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

/// 메모리 링크의 쓰기 측
#[derive(Debug, Clone)]
pub struct MemoryLink {
    tx: mpsc::UnboundedSender<Delivery>,
    controller: LinkController,
}

/// 메모리 링크의 전달 측
#[derive(Debug)]
pub struct LinkWire {
    rx: mpsc::UnboundedReceiver<Delivery>,
    controller: LinkController,
}

impl MemoryLink {
    /// 새 링크 생성
    pub fn new() -> (Self, LinkWire) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = LinkController::default();

        let link = Self {
            tx,
            controller: controller.clone(),
        };
        (link, LinkWire { rx, controller })
    }

    pub fn controller(&self) -> LinkController {
        self.controller.clone()
    }
}

impl Transport for MemoryLink {
    fn write_fragment(&mut self, peer: PeerId, channel: ChannelId, frame: Bytes) -> Result<()> {
        let closed = || Error::TransportWrite {
            channel,
            reason: "링크 닫힘".into(),
        };

        if self.controller.is_closed() {
            return Err(closed());
        }
        self.tx
            .send(Delivery {
                peer,
                channel,
                frame,
            })
            .map_err(|_| closed())
    }
}

impl LinkWire {
    /// 대기 중인 프레임 하나 (동기 테스트용)
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    /// 대기 중인 프레임 전부
    pub fn drain(&mut self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        while let Ok(delivery) = self.rx.try_recv() {
            deliveries.push(delivery);
        }
        deliveries
    }

    /// 쓰기 측 세션의 프레임을 읽기 측 세션으로 전달하고 쓰기 측에 응답
    ///
    /// 어느 한 세션이 종료되면 태스크도 종료
    pub fn connect(mut self, writer: SessionHandle, reader: SessionHandle) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(delivery) = self.rx.recv().await {
                let channel = delivery.channel;

                if self.controller.take_failure(channel) {
                    debug!("실패 주입: channel={}", channel);
                    if writer
                        .write_completed(channel, Err("주입된 쓰기 실패".into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                    continue;
                }

                if reader.fragment_received(delivery.frame).await.is_err() {
                    break;
                }
                let stalled = self.controller.record_delivery();
                if stalled {
                    continue;
                }
                if writer.write_completed(channel, Ok(())).await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_link_queues_writes() {
        let (mut link, mut wire) = MemoryLink::new();

        link.write_fragment(1, 10, Bytes::from_static(b"a")).unwrap();
        link.write_fragment(2, 11, Bytes::from_static(b"b")).unwrap();

        assert_eq!(
            wire.drain(),
            vec![
                Delivery {
                    peer: 1,
                    channel: 10,
                    frame: Bytes::from_static(b"a")
                },
                Delivery {
                    peer: 2,
                    channel: 11,
                    frame: Bytes::from_static(b"b")
                },
            ]
        );
        assert!(wire.try_next().is_none());
    }

    #[test]
    fn test_closed_link_rejects_writes() {
        let (mut link, wire) = MemoryLink::new();
        link.controller().close();

        assert!(matches!(
            link.write_fragment(1, 3, Bytes::new()),
            Err(Error::TransportWrite { channel: 3, .. })
        ));

        drop(wire);
        let (mut link, wire) = MemoryLink::new();
        drop(wire);
        assert!(link.write_fragment(1, 3, Bytes::new()).is_err());
    }

    #[test]
    fn test_failure_injection_is_per_channel() {
        let controller = LinkController::default();
        controller.fail_channel(1, 2);

        assert!(!controller.take_failure(2));
        assert!(controller.take_failure(1));
        assert!(controller.take_failure(1));
        assert!(!controller.take_failure(1));
    }
}
