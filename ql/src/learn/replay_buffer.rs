use std::collections::VecDeque;

use rand::Rng;

/// FIFO with a maximum length; the oldest element is dropped when a new one exceeds the limit.
pub struct BoundedHistory<T> {
    max_len: usize,
    pub(crate) buffer: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    pub fn new(max_len: usize) -> Self {
        assert!(max_len > 0);
        Self {
            max_len,
            buffer: VecDeque::with_capacity(max_len.min(1 << 16)),
        }
    }

    pub fn len(&self) -> usize { self.buffer.len() }

    pub fn is_empty(&self) -> bool { self.buffer.is_empty() }

    pub fn max_len(&self) -> usize { self.max_len }

    pub fn add(
        &mut self,
        element: T,
    ) {
        if self.buffer.len() >= self.max_len {
            self.buffer.pop_front();
        }
        self.buffer.push_back(element);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> { self.buffer.iter() }

    pub fn last(&self) -> Option<&T> { self.buffer.back() }

    /// references to the elements at the specified `indices`
    pub fn get_many(
        &self,
        indices: &[usize],
    ) -> Vec<&T> {
        debug_assert!(!indices.iter().any(|&e| e >= self.buffer.len()));
        indices.iter().map(|&i| &self.buffer[i]).collect()
    }
}

impl<T: Copy> BoundedHistory<T> {
    /// copies of the elements at the specified `indices`
    pub fn get_many_as_val(
        &self,
        indices: &[usize],
    ) -> Vec<T> {
        debug_assert!(!indices.iter().any(|&e| e >= self.buffer.len()));
        indices.iter().map(|&i| self.buffer[i]).collect()
    }
}

pub struct ReplaySamples<'a, S, A> {
    pub action: Vec<A>,
    pub state: Vec<&'a S>,
    pub state_next: Vec<&'a S>,
    pub reward: Vec<f32>,
    pub done: Vec<bool>,
}

/// Experience replay memory: the most recent steps (action, state, next state, reward, done)
/// plus the rewards of the most recent episodes.
pub struct ReplayBuffer<S, A> {
    actions: BoundedHistory<A>,
    states: BoundedHistory<S>,
    states_next: BoundedHistory<S>,
    rewards: BoundedHistory<f32>,
    dones: BoundedHistory<bool>,
    episode_rewards: BoundedHistory<f32>,
}

impl<S, A: Copy> ReplayBuffer<S, A> {
    pub fn new(
        step_history_len: usize,
        episode_reward_history_len: usize,
    ) -> Self {
        Self {
            actions: BoundedHistory::new(step_history_len),
            states: BoundedHistory::new(step_history_len),
            states_next: BoundedHistory::new(step_history_len),
            rewards: BoundedHistory::new(step_history_len),
            dones: BoundedHistory::new(step_history_len),
            episode_rewards: BoundedHistory::new(episode_reward_history_len),
        }
    }

    /// number of recorded steps
    pub fn len(&self) -> usize { self.dones.len() }

    pub fn is_empty(&self) -> bool { self.dones.is_empty() }

    pub fn add(
        &mut self,
        action: A,
        state: S,
        state_next: S,
        reward: f32,
        done: bool,
    ) {
        self.actions.add(action);
        self.states.add(state);
        self.states_next.add(state_next);
        self.rewards.add(reward);
        self.dones.add(done);
    }

    pub fn get_many(
        &self,
        indices: &[usize],
    ) -> ReplaySamples<'_, S, A> {
        ReplaySamples {
            action: self.actions.get_many_as_val(indices),
            state: self.states.get_many(indices),
            state_next: self.states_next.get_many(indices),
            reward: self.rewards.get_many_as_val(indices),
            done: self.dones.get_many_as_val(indices),
        }
    }

    /// `batch_size` distinct random step indices. With `include_most_recent` the newest step
    /// is always part of the batch. If fewer steps are recorded, all of them are returned (shuffled).
    pub fn sample_indices<R: Rng>(
        &self,
        rng: &mut R,
        batch_size: usize,
        include_most_recent: bool,
    ) -> Vec<usize> {
        let len = self.len();
        if batch_size >= len {
            return rand::seq::index::sample(rng, len, len).into_vec();
        }
        if include_most_recent && batch_size > 0 {
            let mut indices = rand::seq::index::sample(rng, len - 1, batch_size - 1).into_vec();
            indices.push(len - 1);
            indices
        } else {
            rand::seq::index::sample(rng, len, batch_size).into_vec()
        }
    }

    pub fn actions(&self) -> &BoundedHistory<A> { &self.actions }

    pub fn add_episode_reward(
        &mut self,
        episode_reward: f32,
    ) {
        self.episode_rewards.add(episode_reward)
    }

    pub fn episode_rewards(&self) -> Vec<f32> { self.episode_rewards.iter().copied().collect() }

    pub fn episode_reward_count(&self) -> usize { self.episode_rewards.len() }

    pub fn avg_episode_reward(&self) -> f32 {
        let c = &self.episode_rewards.buffer;
        if c.is_empty() {
            return 0.0;
        }
        c.iter().sum::<f32>() / c.len() as f32
    }

    pub fn min_episode_reward(&self) -> f32 {
        self.episode_rewards.iter().copied().fold(f32::INFINITY, f32::min)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_bounded_history_drops_oldest() {
        let mut h = BoundedHistory::new(3);
        for i in 0..5 {
            h.add(i);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(h.last(), Some(&4));
        assert_eq!(h.get_many_as_val(&[2, 0]), vec![4, 2]);
    }

    fn filled_buffer(steps: usize) -> ReplayBuffer<usize, u8> {
        let mut b = ReplayBuffer::new(100, 10);
        for i in 0..steps {
            b.add((i % 3) as u8, i, i + 1, i as f32 * 0.5, i % 7 == 6);
        }
        b
    }

    #[test]
    fn test_get_many_keeps_step_records_aligned() {
        let b = filled_buffer(20);
        let samples = b.get_many(&[6, 13]);
        assert_eq!(samples.state, vec![&6, &13]);
        assert_eq!(samples.state_next, vec![&7, &14]);
        assert_eq!(samples.action, vec![0, 1]);
        assert_eq!(samples.reward, vec![3.0, 6.5]);
        assert_eq!(samples.done, vec![true, true]);
    }

    #[test]
    fn test_sample_indices_distinct_and_in_range() {
        let b = filled_buffer(50);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let mut indices = b.sample_indices(&mut rng, 20, false);
            assert_eq!(indices.len(), 20);
            assert!(indices.iter().all(|&i| i < 50));
            indices.sort();
            indices.dedup();
            assert_eq!(indices.len(), 20);
        }
    }

    #[test]
    fn test_sample_indices_include_most_recent() {
        let b = filled_buffer(50);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let mut indices = b.sample_indices(&mut rng, 10, true);
            assert!(indices.contains(&49));
            indices.sort();
            indices.dedup();
            assert_eq!(indices.len(), 10);
        }
    }

    #[test]
    fn test_sample_indices_with_short_history_returns_all() {
        let b = filled_buffer(4);
        let mut indices = b.sample_indices(&mut StdRng::seed_from_u64(1), 10, true);
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_episode_reward_statistics() {
        let mut b: ReplayBuffer<usize, u8> = ReplayBuffer::new(10, 3);
        assert_eq!(b.avg_episode_reward(), 0.0);
        for r in [-21.0, -15.0, -9.0, -3.0] {
            b.add_episode_reward(r);
        }
        assert_eq!(b.episode_reward_count(), 3);
        assert_eq!(b.avg_episode_reward(), -9.0);
        assert_eq!(b.min_episode_reward(), -15.0);
    }
}
