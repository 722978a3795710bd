use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::*;

/// Anything with a size to balance on, in bytes.
pub trait Weighted {
    fn weight(&self) -> u64;
}

/// Redistribution of independent work items across partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Partitioning {
    /// Exactly this many partitions, balanced by weight.
    Count(usize),
    /// Consecutive items packed until a partition would exceed this weight.
    BytesTarget(u64),
}

impl Partitioning {
    /// Deterministic for identical input. Items keep their relative order
    /// within each partition.
    pub fn apply<T: Weighted>(&self, items: Vec<T>) -> Vec<Vec<T>> {
        let total = items.len();
        let partitions = match *self {
            Partitioning::Count(n) => by_count(items, n.max(1)),
            Partitioning::BytesTarget(target) => by_bytes(items, target.max(1)),
        };
        debug!(
            "Partitioned {total} work items into {} partitions ({self:?})",
            partitions.len()
        );
        partitions
    }
}

// Heaviest item first onto the lightest partition
fn by_count<T: Weighted>(items: Vec<T>, n: usize) -> Vec<Vec<T>> {
    let mut indexed: Vec<(usize, T)> = items.into_iter().enumerate().collect();
    indexed.sort_by_key(|(i, item)| (Reverse(item.weight()), *i));

    let mut loads: BinaryHeap<Reverse<(u64, usize)>> = (0..n).map(|p| Reverse((0, p))).collect();
    let mut partitions: Vec<Vec<(usize, T)>> = (0..n).map(|_| vec![]).collect();
    for (i, item) in indexed {
        if let Some(Reverse((load, p))) = loads.pop() {
            loads.push(Reverse((load.saturating_add(item.weight()), p)));
            partitions[p].push((i, item));
        }
    }

    partitions
        .into_iter()
        .map(|mut partition| {
            partition.sort_by_key(|(i, _)| *i);
            partition.into_iter().map(|(_, item)| item).collect()
        })
        .collect()
}

fn by_bytes<T: Weighted>(items: Vec<T>, target: u64) -> Vec<Vec<T>> {
    let mut partitions = vec![];
    let mut current = vec![];
    let mut load = 0u64;
    for item in items {
        let weight = item.weight();
        if !current.is_empty() && load.saturating_add(weight) > target {
            partitions.push(std::mem::take(&mut current));
            load = 0;
        }
        load = load.saturating_add(weight);
        current.push(item);
    }
    if !current.is_empty() {
        partitions.push(current);
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Item(u64);

    impl Weighted for Item {
        fn weight(&self) -> u64 {
            self.0
        }
    }

    fn loads(partitions: &[Vec<Item>]) -> Vec<u64> {
        partitions
            .iter()
            .map(|p| p.iter().map(|i| i.0).sum())
            .collect()
    }

    #[test]
    fn count_balances_skewed_inputs() {
        // one large file among many small ones
        let mut items = vec![Item(100)];
        items.extend(std::iter::repeat(Item(10)).take(20));
        let partitions = Partitioning::Count(3).apply(items);
        assert_eq!(partitions.len(), 3);
        assert_eq!(loads(&partitions), vec![100, 100, 100]);
        assert_eq!(partitions.iter().map(Vec::len).sum::<usize>(), 21);
    }

    #[test]
    fn count_keeps_every_partition() {
        let partitions = Partitioning::Count(4).apply(vec![Item(1), Item(2)]);
        assert_eq!(partitions.len(), 4);
        assert_eq!(partitions.iter().filter(|p| p.is_empty()).count(), 2);
    }

    #[test]
    fn count_is_deterministic_and_ordered() {
        // distinct weights so positions are unambiguous
        let items: Vec<Item> = (0..50).map(|i| Item(1000 + i * 37 % 101)).collect();
        let a = Partitioning::Count(5).apply(items.clone());
        let b = Partitioning::Count(5).apply(items.clone());
        assert_eq!(a, b);
        for partition in a.iter() {
            let positions: Vec<usize> = partition
                .iter()
                .map(|item| items.iter().position(|x| x == item).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn bytes_target_packs_in_order() {
        let items = vec![Item(40), Item(40), Item(40), Item(150), Item(10)];
        let partitions = Partitioning::BytesTarget(100).apply(items);
        assert_eq!(
            partitions,
            vec![
                vec![Item(40), Item(40)],
                vec![Item(40)],
                vec![Item(150)],
                vec![Item(10)],
            ]
        );
    }

    #[test]
    fn empty_input() {
        assert!(Partitioning::BytesTarget(10).apply(Vec::<Item>::new()).is_empty());
        assert_eq!(Partitioning::Count(2).apply(Vec::<Item>::new()).len(), 2);
    }
}
