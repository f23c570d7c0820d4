//! 피어 세션
//!
//! - 피어 하나에 대한 채널 풀, 송신 스케줄러, 재조립 버퍼 묶음
//! - 전송 계층 이벤트를 받아 스케줄러/버퍼로 전달
//! - `spawn_session`: 세션 상태를 단일 tokio 태스크가 소유, 명령 큐로 직렬화

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::pool::ChannelPool;
use crate::reassembly::{FeedOutcome, ReassemblyBuffer};
use crate::scheduler::{FrameWrite, SendScheduler};
use crate::stats::SessionStats;
use crate::task::{Completion, TaskId};
use crate::transport::{Transport, WriteAck};
use crate::{ChannelId, Config, Error, PeerId, Result};

/// 완료된 메시지 수신기 타입
pub type MessageReceiver = mpsc::Receiver<(PeerId, Bytes)>;

/// 피어 세션 (동기 상태 머신)
///
/// 모든 메서드는 한 번에 하나의 이벤트만 처리하는 단일 소유자가 호출해야 함
pub struct PeerSession<T: Transport> {
    peer: PeerId,
    config: Config,
    mtu: usize,
    pool: ChannelPool,
    scheduler: SendScheduler,
    reassembly: ReassemblyBuffer,
    stats: SessionStats,
    transport: T,
}

impl<T: Transport> PeerSession<T> {
    pub fn new(peer: PeerId, config: Config, transport: T) -> Self {
        Self {
            peer,
            mtu: config.default_mtu,
            pool: ChannelPool::new(),
            scheduler: SendScheduler::new(),
            reassembly: ReassemblyBuffer::new(config.max_message_size),
            stats: SessionStats::new(config.default_mtu),
            transport,
            config,
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// 새 태스크에 적용될 프래그먼트 크기
    pub fn max_fragment_size(&self) -> usize {
        Config::fragment_size_for_mtu(self.mtu)
    }

    pub fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    pub fn scheduler(&self) -> &SendScheduler {
        &self.scheduler
    }

    pub fn reassembly(&self) -> &ReassemblyBuffer {
        &self.reassembly
    }

    /// 이 피어로 보낼 payload 추가
    pub fn enqueue(&mut self, payload: Bytes, completion: Option<Completion>) -> Result<TaskId> {
        self.enqueue_to(None, payload, completion)
    }

    /// 목적지를 지정해 payload 추가 (다중 central)
    pub fn enqueue_to(
        &mut self,
        destination: Option<PeerId>,
        payload: Bytes,
        completion: Option<Completion>,
    ) -> Result<TaskId> {
        let max_fragment_size = self.max_fragment_size();
        let id = self.scheduler.enqueue(
            &self.pool,
            payload,
            max_fragment_size,
            destination,
            completion,
        )?;
        self.dispatch();
        Ok(id)
    }

    /// 태스크 취소
    pub fn cancel(&mut self, task_id: TaskId) -> bool {
        let cancelled = self.scheduler.cancel(task_id);
        if cancelled {
            self.dispatch();
        }
        cancelled
    }

    /// 데이터 채널 발견, 새로 등록된 수 반환
    pub fn on_channels_discovered(&mut self, channels: &[ChannelId]) -> usize {
        let added = channels.iter().filter(|&&c| self.pool.register(c)).count();
        if added > 0 {
            info!(
                "피어 {}: 채널 {}개 등록 (동시 전송 {})",
                self.peer,
                added,
                self.pool.capacity()
            );
            self.dispatch();
        }
        added
    }

    /// 데이터 채널 해제
    pub fn on_channels_removed(&mut self, channels: &[ChannelId]) {
        for &channel in channels {
            match self.pool.unregister(channel) {
                Ok(_) => self.scheduler.on_channel_removed(channel),
                Err(e) => warn!("피어 {}: {}", self.peer, e),
            }
        }
        self.dispatch();
    }

    /// 쓰기 응답
    ///
    /// 등록되지 않은 채널이면 `UnknownChannel` (세션 상태는 유지)
    pub fn on_write_complete(&mut self, channel: ChannelId, ack: WriteAck) -> Result<()> {
        let failed = ack.is_err();
        let result = self.scheduler.on_write_complete(&mut self.pool, channel, ack);

        match &result {
            Ok(report) => {
                let window = self.config.stats_window_size;
                let stats = self.stats.channel_mut(channel, window);
                if failed {
                    stats.record_failure();
                } else if let (Some(size), Some(latency)) = (report.size, report.latency) {
                    stats.record_ack(size, latency);
                }
            }
            Err(e) => warn!("피어 {}: {}", self.peer, e),
        }

        self.dispatch();
        result.map(|_| ())
    }

    /// 수신 프레임, 메시지가 완성되면 반환
    pub fn on_fragment_received(&mut self, bytes: Bytes) -> Option<Bytes> {
        match self.reassembly.feed(bytes) {
            FeedOutcome::Complete(message) => Some(message),
            FeedOutcome::Pending | FeedOutcome::Cancelled | FeedOutcome::Discarded(_) => None,
        }
    }

    /// 연결 끊김: 모든 태스크 중단, 채널/버퍼 초기화. 중단된 태스크 수 반환
    pub fn on_disconnected(&mut self) -> usize {
        let interrupted = self.scheduler.interrupt();
        self.pool.clear();
        self.reassembly.reset();
        info!("피어 {} 연결 끊김: 태스크 {}개 중단", self.peer, interrupted);
        interrupted
    }

    /// MTU 변경 (이미 큐에 있는 태스크는 기존 크기 유지)
    pub fn on_mtu_changed(&mut self, mtu: usize) -> Result<()> {
        if Config::fragment_size_for_mtu(mtu) == 0 {
            return Err(Error::InvalidConfig(format!("MTU {}가 너무 작음", mtu)));
        }
        debug!("피어 {} MTU 변경: {} -> {}", self.peer, self.mtu, mtu);
        self.mtu = mtu;
        Ok(())
    }

    /// 주기 검사: 쓰기 타임아웃 처리. 타임아웃된 쓰기 수 반환
    pub fn on_tick(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.config.write_timeout() else {
            return 0;
        };

        let expired = self.scheduler.expire(now, timeout);
        if expired > 0 {
            self.dispatch();
        }
        expired
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        stats.send = self.scheduler.stats().clone();
        stats.receive = self.reassembly.stats().clone();
        stats.queued_tasks = self.scheduler.len();
        stats.mtu = self.mtu;
        stats
    }

    fn dispatch(&mut self) -> usize {
        let peer = self.peer;
        let transport = &mut self.transport;
        let mut write = |w: FrameWrite| {
            transport.write_fragment(w.destination.unwrap_or(peer), w.channel, w.frame.encode())
        };
        self.scheduler.dispatch(&mut self.pool, &mut write)
    }
}

/// 세션 태스크 명령
enum SessionCmd {
    Send {
        destination: Option<PeerId>,
        payload: Bytes,
        completion: Completion,
        reply: oneshot::Sender<Result<TaskId>>,
    },
    Cancel {
        task_id: TaskId,
        reply: oneshot::Sender<bool>,
    },
    ChannelsDiscovered(Vec<ChannelId>),
    ChannelsRemoved(Vec<ChannelId>),
    WriteComplete {
        channel: ChannelId,
        ack: WriteAck,
    },
    Fragment(Bytes),
    MtuChanged(usize),
    Disconnected,
    Tick,
    Stop,
}

/// 진행 중인 송신
#[derive(Debug)]
pub struct PendingSend {
    id: TaskId,
    done: oneshot::Receiver<Result<()>>,
}

impl PendingSend {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// 완료 대기
    pub async fn wait(self) -> Result<()> {
        self.done.await.map_err(|_| Error::SessionClosed)?
    }
}

/// 세션 핸들 (외부에서 제어용)
#[derive(Clone)]
pub struct SessionHandle {
    peer: PeerId,
    cmd_tx: mpsc::Sender<SessionCmd>,
    stats: Arc<RwLock<SessionStats>>,
    running: Arc<AtomicBool>,
}

/// 세션 시작
pub fn spawn_session<T: Transport>(
    peer: PeerId,
    config: Config,
    transport: T,
) -> Result<(SessionHandle, MessageReceiver)> {
    let (message_tx, message_rx) = mpsc::channel(config.message_queue_size.max(1));
    let handle = spawn_session_with(peer, config, transport, message_tx)?;
    Ok((handle, message_rx))
}

/// 완료 메시지를 기존 채널로 보내는 세션 시작 (허브용)
pub fn spawn_session_with<T: Transport>(
    peer: PeerId,
    config: Config,
    transport: T,
    message_tx: mpsc::Sender<(PeerId, Bytes)>,
) -> Result<SessionHandle> {
    config.validate()?;

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCmd>(config.command_queue_size);
    let stats = Arc::new(RwLock::new(SessionStats::new(config.default_mtu)));
    let running = Arc::new(AtomicBool::new(true));

    // 타임아웃 검사 타이머 (핸들이 모두 사라지면 종료)
    if config.write_timeout().is_some() {
        let weak_tx = cmd_tx.downgrade();
        let running_tick = running.clone();
        let tick_interval = config.tick_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            while running_tick.load(Ordering::SeqCst) {
                interval.tick().await;
                let Some(tx) = weak_tx.upgrade() else {
                    break;
                };
                if tx.send(SessionCmd::Tick).await.is_err() {
                    break;
                }
            }
        });
    }

    let mut session = PeerSession::new(peer, config, transport);
    let stats_main = stats.clone();
    let running_main = running.clone();

    info!("피어 {} 세션 시작", peer);

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                SessionCmd::Send {
                    destination,
                    payload,
                    completion,
                    reply,
                } => {
                    let result = session.enqueue_to(destination, payload, Some(completion));
                    let _ = reply.send(result);
                }
                SessionCmd::Cancel { task_id, reply } => {
                    let _ = reply.send(session.cancel(task_id));
                }
                SessionCmd::ChannelsDiscovered(channels) => {
                    session.on_channels_discovered(&channels);
                }
                SessionCmd::ChannelsRemoved(channels) => {
                    session.on_channels_removed(&channels);
                }
                SessionCmd::WriteComplete { channel, ack } => {
                    // UnknownChannel은 세션 안에서 이미 기록됨
                    let _ = session.on_write_complete(channel, ack);
                }
                SessionCmd::Fragment(bytes) => {
                    if let Some(message) = session.on_fragment_received(bytes) {
                        if message_tx.send((peer, message)).await.is_err() {
                            debug!("피어 {}: 메시지 수신기 없음", peer);
                        }
                    }
                }
                SessionCmd::MtuChanged(mtu) => {
                    if let Err(e) = session.on_mtu_changed(mtu) {
                        warn!("피어 {}: {}", peer, e);
                    }
                }
                SessionCmd::Disconnected => {
                    session.on_disconnected();
                }
                SessionCmd::Tick => {
                    session.on_tick(Instant::now());
                }
                SessionCmd::Stop => {
                    break;
                }
            }

            // 통계 업데이트
            *stats_main.write() = session.stats();
        }

        // 남은 태스크는 중단 처리
        session.on_disconnected();
        *stats_main.write() = session.stats();
        running_main.store(false, Ordering::SeqCst);
        info!("피어 {} 세션 종료", peer);
    });

    Ok(SessionHandle {
        peer,
        cmd_tx,
        stats,
        running,
    })
}

impl SessionHandle {
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    async fn command(&self, cmd: SessionCmd) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// payload 전송 후 완료 대기
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        self.start_send(payload).await?.wait().await
    }

    /// payload 전송 시작
    pub async fn start_send(&self, payload: Bytes) -> Result<PendingSend> {
        self.start_send_to(None, payload).await
    }

    /// 목적지를 지정해 전송 시작
    pub async fn start_send_to(
        &self,
        destination: Option<PeerId>,
        payload: Bytes,
    ) -> Result<PendingSend> {
        let (done_tx, done) = oneshot::channel();
        let (reply, reply_rx) = oneshot::channel();
        let completion: Completion = Box::new(move |_, result| {
            let _ = done_tx.send(result);
        });

        self.command(SessionCmd::Send {
            destination,
            payload,
            completion,
            reply,
        })
        .await?;

        let id = reply_rx.await.map_err(|_| Error::SessionClosed)??;
        Ok(PendingSend { id, done })
    }

    /// 태스크 취소
    pub async fn cancel(&self, task_id: TaskId) -> Result<bool> {
        let (reply, reply_rx) = oneshot::channel();
        self.command(SessionCmd::Cancel { task_id, reply }).await?;
        reply_rx.await.map_err(|_| Error::SessionClosed)
    }

    pub async fn channels_discovered(&self, channels: Vec<ChannelId>) -> Result<()> {
        self.command(SessionCmd::ChannelsDiscovered(channels)).await
    }

    pub async fn channels_removed(&self, channels: Vec<ChannelId>) -> Result<()> {
        self.command(SessionCmd::ChannelsRemoved(channels)).await
    }

    /// 전송 계층의 쓰기 응답 전달
    pub async fn write_completed(&self, channel: ChannelId, ack: WriteAck) -> Result<()> {
        self.command(SessionCmd::WriteComplete { channel, ack }).await
    }

    /// 전송 계층의 수신 프레임 전달
    pub async fn fragment_received(&self, bytes: Bytes) -> Result<()> {
        self.command(SessionCmd::Fragment(bytes)).await
    }

    pub async fn mtu_changed(&self, mtu: usize) -> Result<()> {
        self.command(SessionCmd::MtuChanged(mtu)).await
    }

    pub async fn disconnected(&self) -> Result<()> {
        self.command(SessionCmd::Disconnected).await
    }

    /// 통계 반환
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 정지 (대기 중인 태스크는 `Interrupted`)
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.cmd_tx.send(SessionCmd::Stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::codec::{Frame, CANCEL_FRAME};
    use crate::transport::{LinkWire, MemoryLink};

    type Results = Arc<Mutex<Vec<(TaskId, Result<()>)>>>;

    fn recorder(results: &Results) -> Option<Completion> {
        let results = results.clone();
        Some(Box::new(move |id, result| {
            results.lock().unwrap().push((id, result));
        }))
    }

    fn session(config: Config) -> (PeerSession<MemoryLink>, LinkWire) {
        let (link, wire) = MemoryLink::new();
        (PeerSession::new(7, config, link), wire)
    }

    /// 송신 세션의 쓰기를 모두 수신 세션에 전달하고 응답
    fn pump(
        sender: &mut PeerSession<MemoryLink>,
        wire: &mut LinkWire,
        receiver: &mut PeerSession<MemoryLink>,
    ) -> Vec<Bytes> {
        let mut messages = Vec::new();
        while let Some(delivery) = wire.try_next() {
            if let Some(message) = receiver.on_fragment_received(delivery.frame) {
                messages.push(message);
            }
            sender.on_write_complete(delivery.channel, Ok(())).unwrap();
        }
        messages
    }

    #[test]
    fn test_session_round_trip() {
        let (mut a, mut wire) = session(Config::default());
        let (mut b, _) = session(Config::default());
        let results: Results = Default::default();

        a.on_channels_discovered(&[1, 2, 3]);
        let payload = Bytes::from((0..200u8).collect::<Vec<u8>>());
        let id = a.enqueue(payload.clone(), recorder(&results)).unwrap();

        let messages = pump(&mut a, &mut wire, &mut b);

        assert_eq!(messages, vec![payload]);
        assert_eq!(results.lock().unwrap().as_slice(), &[(id, Ok(()))]);

        let stats = a.stats();
        assert_eq!(stats.send.tasks_completed, 1);
        assert_eq!(stats.send.fragments_sent, 12); // ceil(200 / 17)
        assert_eq!(stats.channels.len(), 3);
        assert_eq!(b.stats().receive.messages_received, 1);
    }

    #[test]
    fn test_enqueue_without_channels() {
        let (mut a, mut wire) = session(Config::default());
        let results: Results = Default::default();

        let result = a.enqueue(Bytes::from_static(b"x"), recorder(&results));

        assert_eq!(result, Err(Error::NoChannelsAvailable));
        assert_eq!(results.lock().unwrap()[0].1, Err(Error::NoChannelsAvailable));
        assert!(wire.try_next().is_none());
    }

    #[test]
    fn test_disconnect_resets_everything() {
        let (mut a, mut wire) = session(Config::default());
        let results: Results = Default::default();

        a.on_channels_discovered(&[1]);
        a.enqueue(Bytes::from(vec![1u8; 100]), recorder(&results)).unwrap();
        a.enqueue(Bytes::from(vec![2u8; 100]), recorder(&results)).unwrap();
        a.on_fragment_received(
            Frame::Data {
                seq: 0,
                payload: Bytes::from_static(b"partial"),
            }
            .encode(),
        );
        assert_eq!(wire.drain().len(), 1);

        assert_eq!(a.on_disconnected(), 2);
        assert!(a.pool().is_empty());
        assert!(a.scheduler().is_empty());
        assert_eq!(a.reassembly().buffered_len(), 0);
        assert!(results
            .lock()
            .unwrap()
            .iter()
            .all(|(_, r)| *r == Err(Error::Interrupted)));
    }

    #[test]
    fn test_mtu_change_applies_to_new_tasks() {
        let (mut a, mut wire) = session(Config::default());
        let (mut b, _) = session(Config::default());
        a.on_channels_discovered(&[1]);

        assert!(a.on_mtu_changed(5).is_err());
        a.on_mtu_changed(103).unwrap();
        assert_eq!(a.max_fragment_size(), 97);

        a.enqueue(Bytes::from(vec![9u8; 194]), None).unwrap();
        let first = wire.try_next().unwrap();
        assert_eq!(first.frame.len(), 100);

        b.on_fragment_received(first.frame);
        a.on_write_complete(first.channel, Ok(())).unwrap();
        let messages = pump(&mut a, &mut wire, &mut b);
        assert_eq!(messages.len(), 1);
        assert_eq!(a.stats().mtu, 103);
    }

    #[test]
    fn test_cancel_active_sends_marker() {
        let (mut a, mut wire) = session(Config::default());
        let (mut b, _) = session(Config::default());
        let results: Results = Default::default();
        a.on_channels_discovered(&[1]);

        let id = a.enqueue(Bytes::from(vec![3u8; 60]), recorder(&results)).unwrap();
        let first = wire.try_next().unwrap();
        b.on_fragment_received(first.frame);
        assert!(b.reassembly().is_accumulating());

        assert!(a.cancel(id));
        a.on_write_complete(first.channel, Ok(())).unwrap();

        let marker = wire.try_next().unwrap();
        assert_eq!(marker.frame.as_ref(), &CANCEL_FRAME);
        assert_eq!(b.on_fragment_received(marker.frame), None);
        assert_eq!(b.stats().receive.messages_cancelled, 1);
        assert_eq!(
            results.lock().unwrap().as_slice(),
            &[(id, Err(Error::Cancelled { task_id: id }))]
        );
    }

    #[test]
    fn test_tick_expires_stalled_write() {
        let config = Config {
            write_timeout_ms: 50,
            ..Config::default()
        };
        let (mut a, mut wire) = session(config);
        let results: Results = Default::default();
        a.on_channels_discovered(&[1, 2]);

        a.enqueue(Bytes::from_static(b"stall"), recorder(&results)).unwrap();
        assert_eq!(wire.drain().len(), 1);

        assert_eq!(a.on_tick(Instant::now()), 0);
        assert_eq!(a.on_tick(Instant::now() + Duration::from_millis(50)), 1);

        assert!(matches!(
            results.lock().unwrap()[0].1,
            Err(Error::WriteTimeout { channel: 1, .. })
        ));
        let marker = wire.try_next().unwrap();
        assert_eq!(marker.channel, 2);
        assert_eq!(marker.frame.as_ref(), &CANCEL_FRAME);
        assert_eq!(a.stats().send.write_timeouts, 1);
    }

    #[test]
    fn test_unknown_channel_ack_is_not_fatal() {
        let (mut a, _wire) = session(Config::default());
        a.on_channels_discovered(&[1]);

        assert_eq!(
            a.on_write_complete(4, Ok(())),
            Err(Error::UnknownChannel { channel: 4 })
        );
        assert_eq!(a.pool().idle_count(), 1);
    }

    #[test]
    fn test_channel_removed_fails_head() {
        let (mut a, mut wire) = session(Config::default());
        let results: Results = Default::default();
        a.on_channels_discovered(&[1, 2]);

        a.enqueue(Bytes::from(vec![0u8; 100]), recorder(&results)).unwrap();
        assert_eq!(wire.drain().len(), 2);

        a.on_channels_removed(&[2, 9]);
        assert!(matches!(
            results.lock().unwrap()[0].1,
            Err(Error::TransportWrite { channel: 2, .. })
        ));
        assert_eq!(a.pool().channel_ids(), vec![1]);
    }

    async fn linked_pair(config: Config) -> (SessionHandle, SessionHandle, MessageReceiver) {
        let (link_ab, wire_ab) = MemoryLink::new();
        let (link_ba, wire_ba) = MemoryLink::new();

        // 각 세션의 PeerId는 상대 피어
        let (a, _a_messages) = spawn_session(2, config.clone(), link_ab).unwrap();
        let (b, b_messages) = spawn_session(1, config, link_ba).unwrap();

        wire_ab.connect(a.clone(), b.clone());
        wire_ba.connect(b.clone(), a.clone());

        a.channels_discovered(vec![1, 2]).await.unwrap();
        b.channels_discovered(vec![1, 2]).await.unwrap();
        (a, b, b_messages)
    }

    #[tokio::test]
    async fn test_spawned_session_delivers_messages() {
        let (a, _b, mut messages) = linked_pair(Config::default()).await;

        let first = Bytes::from(vec![0x11; 500]);
        let second = Bytes::from_static(&CANCEL_FRAME);

        a.send(first.clone()).await.unwrap();
        a.send(second.clone()).await.unwrap();

        assert_eq!(messages.recv().await, Some((1, first)));
        assert_eq!(messages.recv().await, Some((1, second)));
    }

    #[tokio::test]
    async fn test_pending_send_and_stop() {
        let (link, _wire) = MemoryLink::new();
        let (handle, _messages) = spawn_session(3, Config::default(), link).unwrap();
        handle.channels_discovered(vec![1]).await.unwrap();

        // 응답이 없으므로 완료되지 않음
        let pending = handle.start_send(Bytes::from_static(b"never acked")).await.unwrap();
        assert_eq!(pending.id(), 1);

        handle.stop().await;
        assert_eq!(pending.wait().await, Err(Error::Interrupted));
        assert!(!handle.is_running());
        assert_eq!(
            handle.send(Bytes::from_static(b"late")).await,
            Err(Error::SessionClosed)
        );
    }

    #[tokio::test]
    async fn test_send_without_channels_fails() {
        let (link, _wire) = MemoryLink::new();
        let (handle, _messages) = spawn_session(4, Config::default(), link).unwrap();

        assert_eq!(
            handle.send(Bytes::from_static(b"x")).await,
            Err(Error::NoChannelsAvailable)
        );
    }

    #[test]
    fn test_spawn_rejects_invalid_config() {
        let config = Config {
            default_mtu: 4,
            ..Config::default()
        };
        let (link, _wire) = MemoryLink::new();
        assert!(matches!(
            spawn_session(1, config, link),
            Err(Error::InvalidConfig(_))
        ));
    }
}
