//! 세션 허브 (다중 central)
//!
//! 로컬 장치 하나가 여러 피어에 연결된 경우 피어별 세션을 묶어 관리.
//! 세션끼리는 상태를 공유하지 않고 허브는 핸들만 보관.

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::session::{spawn_session_with, MessageReceiver, PendingSend, SessionHandle};
use crate::stats::SessionStats;
use crate::transport::Transport;
use crate::{Config, Error, PeerId, Result};

/// 피어별 세션 허브
pub struct SessionHub {
    config: Config,
    sessions: DashMap<PeerId, SessionHandle>,
    message_tx: mpsc::Sender<(PeerId, Bytes)>,
}

impl SessionHub {
    /// 새 허브 생성, 모든 피어의 완성 메시지는 하나의 수신기로 전달
    pub fn new(config: Config) -> Result<(Self, MessageReceiver)> {
        config.validate()?;
        let (message_tx, message_rx) = mpsc::channel(config.message_queue_size);

        let hub = Self {
            config,
            sessions: DashMap::new(),
            message_tx,
        };
        Ok((hub, message_rx))
    }

    /// 피어 연결, 세션 시작
    ///
    /// 같은 피어의 기존 세션은 정지
    pub async fn attach<T: Transport>(&self, peer: PeerId, transport: T) -> Result<SessionHandle> {
        let handle =
            spawn_session_with(peer, self.config.clone(), transport, self.message_tx.clone())?;

        if let Some(previous) = self.sessions.insert(peer, handle.clone()) {
            warn!("피어 {} 재연결: 기존 세션 정지", peer);
            previous.stop().await;
        }

        info!("피어 {} 연결 (총 {})", peer, self.sessions.len());
        Ok(handle)
    }

    /// 피어 연결 해제, 진행 중 전송은 `Interrupted`
    pub async fn detach(&self, peer: PeerId) -> Result<()> {
        let (_, handle) = self
            .sessions
            .remove(&peer)
            .ok_or(Error::UnknownPeer { peer })?;

        // 이미 종료된 세션이어도 정지는 진행
        let _ = handle.disconnected().await;
        handle.stop().await;
        info!("피어 {} 연결 해제 (남은 {})", peer, self.sessions.len());
        Ok(())
    }

    /// 세션 핸들
    pub fn session(&self, peer: PeerId) -> Option<SessionHandle> {
        self.sessions.get(&peer).map(|entry| entry.value().clone())
    }

    /// 한 피어로 전송 후 완료 대기
    pub async fn send_to(&self, peer: PeerId, payload: Bytes) -> Result<()> {
        self.start_send_to(peer, payload).await?.wait().await
    }

    /// 한 피어로 전송 시작
    pub async fn start_send_to(&self, peer: PeerId, payload: Bytes) -> Result<PendingSend> {
        let handle = self.session(peer).ok_or(Error::UnknownPeer { peer })?;
        handle.start_send_to(Some(peer), payload).await
    }

    /// 연결된 모든 피어로 전송, 피어별 결과 반환 (PeerId 순)
    pub async fn broadcast(&self, payload: Bytes) -> Vec<(PeerId, Result<()>)> {
        let mut handles: Vec<SessionHandle> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        handles.sort_by_key(|h| h.peer());

        // 모든 피어에 먼저 큐잉한 뒤 대기 (피어끼리 병렬 진행)
        let mut pending = Vec::with_capacity(handles.len());
        for handle in &handles {
            let peer = handle.peer();
            pending.push((peer, handle.start_send_to(Some(peer), payload.clone()).await));
        }

        let mut results = Vec::with_capacity(pending.len());
        for (peer, started) in pending {
            let result = match started {
                Ok(send) => send.wait().await,
                Err(e) => Err(e),
            };
            results.push((peer, result));
        }
        results
    }

    /// 연결된 피어 목록 (정렬)
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        peers.sort_unstable();
        peers
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 전체 세션 통계 합산
    ///
    /// 채널 통계는 채널 ID별로 합치고 MTU는 세션 중 가장 작은 값
    pub fn stats(&self) -> SessionStats {
        let mut total: Option<SessionStats> = None;
        for entry in self.sessions.iter() {
            let stats = entry.value().stats();
            match total.as_mut() {
                Some(total) => total.merge(&stats),
                None => total = Some(stats),
            }
        }
        total.unwrap_or_else(|| SessionStats::new(self.config.default_mtu))
    }

    /// 모든 세션 정지
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        self.sessions.clear();

        for handle in handles {
            handle.stop().await;
        }
    }
}
