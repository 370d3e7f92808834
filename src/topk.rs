use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

/// 定容的 Top-K 选择器，只保留最小的 K 个元素
///
/// 内部是一个大顶堆，堆顶为当前最差的元素。插入新元素后若超过 K 个，则淘汰堆顶。
/// 单次插入 O(log K)，整体 O(N log K)，额外空间 O(K)。
#[derive(Debug, Clone)]
pub struct TopK<T: Ord> {
    k: usize,
    heap: BinaryHeap<T>,
}

impl<T: Ord> TopK<T> {
    pub fn new(k: usize) -> Self {
        // 注意 k 可能远大于实际元素数量，此处不按 k 预分配
        Self { k, heap: BinaryHeap::new() }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// 当前保留的元素中最差的一个
    pub fn worst(&self) -> Option<&T> {
        self.heap.peek()
    }

    /// 插入一个候选，返回该候选是否被保留
    pub fn push(&mut self, item: T) -> bool {
        if self.k == 0 {
            return false;
        }
        if self.heap.len() < self.k {
            self.heap.push(item);
            return true;
        }
        match self.heap.peek() {
            Some(worst) if item < *worst => {
                self.heap.pop();
                self.heap.push(item);
                true
            }
            _ => false,
        }
    }

    /// 合并另一个选择器的结果，用于并行扫描后的归约
    pub fn merge(self, other: Self) -> Self {
        // 从较小的一侧往较大的一侧合并
        let (mut dst, src) =
            if self.heap.len() >= other.heap.len() { (self, other) } else { (other, self) };
        for item in src.heap {
            dst.push(item);
        }
        dst
    }

    /// 取出全部元素，按从好到差（升序）排列
    pub fn into_sorted_vec(self) -> Vec<T> {
        self.heap.into_sorted_vec()
    }
}

impl<T: Ord> Extend<T> for TopK<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

/// 检索候选：按距离升序，距离相同时按图片 ID 的字典序
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub distance: f64,
    pub id: &'a str,
}

impl<'a> Candidate<'a> {
    pub fn new(distance: f64, id: &'a str) -> Self {
        Self { distance, id }
    }

    pub fn to_match(self) -> Match {
        Match { id: self.id.to_owned(), distance: self.distance }
    }
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance).then_with(|| self.id.cmp(other.id))
    }
}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

/// 一条检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// 图片 ID
    pub id: String,
    /// 与查询的距离，越小越相似
    pub distance: f64,
}

impl Match {
    pub fn new(id: impl Into<String>, distance: f64) -> Self {
        Self { id: id.into(), distance }
    }
}

/// 检索结果，按距离升序排列
pub type QueryResult = Vec<Match>;

#[cfg(test)]
mod tests {
    use rand::prelude::*;
    use rstest::*;

    use super::*;

    #[test]
    fn test_topk_keeps_smallest() {
        let mut top = TopK::new(3);
        top.extend([5, 3, 8, 1, 4, 9, 2]);
        assert_eq!(top.into_sorted_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_topk_zero_capacity() {
        let mut top = TopK::new(0);
        assert!(!top.push(1));
        assert!(top.is_empty());
        assert!(top.into_sorted_vec().is_empty());
    }

    #[test]
    fn test_topk_fewer_than_k() {
        let mut top = TopK::new(10);
        top.extend([3, 1, 2]);
        assert_eq!(top.len(), 3);
        assert_eq!(top.into_sorted_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_topk_push_reports_eviction() {
        let mut top = TopK::new(2);
        assert!(top.push(5));
        assert!(top.push(3));
        assert_eq!(top.worst(), Some(&5));
        assert!(!top.push(7));
        assert!(top.push(1));
        assert_eq!(top.worst(), Some(&3));
    }

    #[rstest]
    #[case(1)]
    #[case(5)]
    #[case(64)]
    #[case(1000)]
    fn test_topk_merge_matches_single_pass(#[case] k: usize) {
        let mut rng = StdRng::seed_from_u64(42);
        let data: Vec<u32> = (0..500).map(|_| rng.random_range(0..10000)).collect();

        let mut single = TopK::new(k);
        single.extend(data.iter().copied());

        let merged = data
            .chunks(37)
            .map(|chunk| {
                let mut top = TopK::new(k);
                top.extend(chunk.iter().copied());
                top
            })
            .fold(TopK::new(k), TopK::merge);

        let mut expected = data.clone();
        expected.sort_unstable();
        expected.truncate(k);

        assert_eq!(single.into_sorted_vec(), expected);
        assert_eq!(merged.into_sorted_vec(), expected);
    }

    #[test]
    fn test_candidate_tie_break_by_id() {
        let mut top = TopK::new(2);
        top.push(Candidate::new(1.0, "c"));
        top.push(Candidate::new(1.0, "a"));
        top.push(Candidate::new(1.0, "b"));
        let ids: Vec<_> = top.into_sorted_vec().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_candidate_worst_distance_ranks_last() {
        let mut top = TopK::new(3);
        top.push(Candidate::new(f64::MAX, "a"));
        top.push(Candidate::new(2.0, "b"));
        top.push(Candidate::new(0.5, "c"));
        let ids: Vec<_> = top.into_sorted_vec().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }
}
