//! 채널 풀
//!
//! 한 피어로의 outbound 쓰기에 사용할 채널 집합과 idle/busy 상태.
//! 채널은 외부 탐색 계층이 등록/해제하며 풀은 상태만 추적.

use std::time::Instant;

use crate::{ChannelId, Error, Result};

/// 채널 정보
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    /// 채널 ID
    pub id: ChannelId,

    /// 쓰기 가능 여부 (응답 대기 중이면 false)
    pub idle: bool,

    /// 마지막 상태 변경 시간
    pub last_activity: Instant,

    /// 이 채널로 나간 쓰기 수
    pub writes: u64,
}

impl ChannelInfo {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            idle: true,
            last_activity: Instant::now(),
            writes: 0,
        }
    }
}

/// 데이터 전송용 채널 풀
///
/// 등록 순서를 유지하며, idle 채널 선택 시 먼저 등록된 채널이 우선
#[derive(Debug, Default)]
pub struct ChannelPool {
    channels: Vec<ChannelInfo>,
}

impl ChannelPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 채널 등록 (이미 있으면 false)
    pub fn register(&mut self, id: ChannelId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.channels.push(ChannelInfo::new(id));
        true
    }

    /// 채널 해제, 해제 직전 busy 여부 반환
    pub fn unregister(&mut self, id: ChannelId) -> Result<bool> {
        let index = self
            .channels
            .iter()
            .position(|c| c.id == id)
            .ok_or(Error::UnknownChannel { channel: id })?;
        let info = self.channels.remove(index);
        Ok(!info.idle)
    }

    /// idle 채널 목록 (등록 순서)
    pub fn idle_channels(&self) -> Vec<ChannelId> {
        self.channels
            .iter()
            .filter(|c| c.idle)
            .map(|c| c.id)
            .collect()
    }

    /// 첫 번째 idle 채널
    pub fn first_idle(&self) -> Option<ChannelId> {
        self.channels.iter().find(|c| c.idle).map(|c| c.id)
    }

    /// 쓰기 발행 시 호출
    pub fn mark_busy(&mut self, id: ChannelId) -> Result<()> {
        let info = self.get_mut(id)?;
        info.idle = false;
        info.writes += 1;
        info.last_activity = Instant::now();
        Ok(())
    }

    /// 쓰기 응답 시 호출
    pub fn mark_idle(&mut self, id: ChannelId) -> Result<()> {
        let info = self.get_mut(id)?;
        info.idle = true;
        info.last_activity = Instant::now();
        Ok(())
    }

    fn get_mut(&mut self, id: ChannelId) -> Result<&mut ChannelInfo> {
        self.channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(Error::UnknownChannel { channel: id })
    }

    pub fn get(&self, id: ChannelId) -> Option<&ChannelInfo> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn is_idle(&self, id: ChannelId) -> Option<bool> {
        self.get(id).map(|c| c.idle)
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.get(id).is_some()
    }

    /// 등록된 채널 ID 목록 (등록 순서)
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|c| c.id).collect()
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// 동시에 보낼 수 있는 최대 프래그먼트 수
    pub fn capacity(&self) -> usize {
        self.channels.len()
    }

    pub fn idle_count(&self) -> usize {
        self.channels.iter().filter(|c| c.idle).count()
    }

    pub fn busy_count(&self) -> usize {
        self.channels.len() - self.idle_count()
    }

    /// 전체 해제 (연결 끊김)
    pub fn clear(&mut self) {
        self.channels.clear();
    }
}
