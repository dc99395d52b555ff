use crate::instance::TourInstance;
use crate::solution::Solution;
use std::collections::HashSet;

pub trait ConstructionHeuristic {
    fn construct(&self, instance: &TourInstance) -> Solution;
    fn name(&self) -> &str;
}

/// Extend the path from the origin by always taking the cheapest arc out of
/// its current end. Ties go to the lowest location index.
fn extend_cheapest_arc(instance: &TourInstance) -> Vec<usize> {
    let n = instance.dimension();
    let mut tour = Vec::with_capacity(n);
    let mut visited = vec![false; n];

    let mut current = instance.start;
    tour.push(current);
    visited[current] = true;

    while tour.len() < n {
        let next = (0..n)
            .filter(|&j| !visited[j])
            .min_by_key(|&j| (instance.distance(current, j), j));

        match next {
            Some(next) => {
                tour.push(next);
                visited[next] = true;
                current = next;
            }
            None => break,
        }
    }

    tour
}

/// Path Cheapest Arc
///
/// Starting from the origin, repeatedly connects the end of the path to the
/// unvisited location reached by the cheapest arc.
pub struct PathCheapestArc;

impl PathCheapestArc {
    pub fn new() -> Self {
        PathCheapestArc
    }
}

impl Default for PathCheapestArc {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for PathCheapestArc {
    fn construct(&self, instance: &TourInstance) -> Solution {
        let start = std::time::Instant::now();
        let tour = extend_cheapest_arc(instance);
        let mut solution = Solution::from_tour(instance, tour, self.name());
        solution.computation_time = start.elapsed().as_secs_f64();
        solution
    }

    fn name(&self) -> &str {
        "PathCheapestArc"
    }
}

/// Nearest Neighbor Heuristic
///
/// Visits the nearest unvisited location next. On a distance matrix this is
/// the same rule as [`PathCheapestArc`].
pub struct NearestNeighborHeuristic;

impl NearestNeighborHeuristic {
    pub fn new() -> Self {
        NearestNeighborHeuristic
    }
}

impl Default for NearestNeighborHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for NearestNeighborHeuristic {
    fn construct(&self, instance: &TourInstance) -> Solution {
        let start = std::time::Instant::now();
        let tour = extend_cheapest_arc(instance);
        let mut solution = Solution::from_tour(instance, tour, self.name());
        solution.computation_time = start.elapsed().as_secs_f64();
        solution
    }

    fn name(&self) -> &str {
        "NearestNeighbor"
    }
}

/// Greedy Insertion Heuristic
///
/// Starts from the origin alone and inserts the remaining locations one at a
/// time at the position that increases the tour length the least.
pub struct GreedyInsertionHeuristic {
    /// Insert the location farthest from the current tour first
    pub farthest_insertion: bool,
}

impl GreedyInsertionHeuristic {
    pub fn new() -> Self {
        GreedyInsertionHeuristic {
            farthest_insertion: false,
        }
    }

    pub fn farthest() -> Self {
        GreedyInsertionHeuristic {
            farthest_insertion: true,
        }
    }

    /// Cost increase of inserting `node` right after `tour[pos]`
    fn insertion_cost(&self, instance: &TourInstance, tour: &[usize], node: usize, pos: usize) -> i64 {
        let prev = tour[pos];
        let next = if pos + 1 < tour.len() {
            Some(tour[pos + 1])
        } else if instance.close_loop {
            Some(tour[0])
        } else {
            None
        };

        let added = instance.distance(prev, node) as i64;
        match next {
            Some(next) => {
                added + instance.distance(node, next) as i64 - instance.distance(prev, next) as i64
            }
            None => added,
        }
    }

    /// Find best insertion position for a node
    fn find_best_insertion(&self, instance: &TourInstance, tour: &[usize], node: usize) -> (usize, i64) {
        let mut best_pos = 0;
        let mut best_cost = i64::MAX;

        for pos in 0..tour.len() {
            let cost = self.insertion_cost(instance, tour, node, pos);
            if cost < best_cost {
                best_cost = cost;
                best_pos = pos;
            }
        }

        (best_pos, best_cost)
    }

    /// Unvisited location whose closest tour member is farthest away
    fn farthest_from_tour(&self, instance: &TourInstance, tour: &[usize], unvisited: &HashSet<usize>) -> Option<usize> {
        let mut candidates: Vec<usize> = unvisited.iter().cloned().collect();
        candidates.sort_unstable();

        let mut best = None;
        let mut best_dist = 0;
        for node in candidates {
            let dist = tour
                .iter()
                .map(|&t| instance.distance(t, node).min(instance.distance(node, t)))
                .min()
                .unwrap_or(0);
            if best.is_none() || dist > best_dist {
                best = Some(node);
                best_dist = dist;
            }
        }
        best
    }
}

impl Default for GreedyInsertionHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for GreedyInsertionHeuristic {
    fn construct(&self, instance: &TourInstance) -> Solution {
        let start = std::time::Instant::now();

        let mut tour = vec![instance.start];
        let mut unvisited: HashSet<usize> = (0..instance.dimension())
            .filter(|&i| i != instance.start)
            .collect();

        while !unvisited.is_empty() {
            let (node, pos) = if self.farthest_insertion {
                let node = match self.farthest_from_tour(instance, &tour, &unvisited) {
                    Some(node) => node,
                    None => break,
                };
                (node, self.find_best_insertion(instance, &tour, node).0)
            } else {
                let mut candidates: Vec<usize> = unvisited.iter().cloned().collect();
                candidates.sort_unstable();

                let mut best: Option<(usize, usize, i64)> = None;
                for node in candidates {
                    let (pos, cost) = self.find_best_insertion(instance, &tour, node);
                    if best.map_or(true, |(_, _, c)| cost < c) {
                        best = Some((node, pos, cost));
                    }
                }
                match best {
                    Some((node, pos, _)) => (node, pos),
                    None => break,
                }
            };

            tour.insert(pos + 1, node);
            unvisited.remove(&node);
        }

        let mut solution = Solution::from_tour(instance, tour, self.name());
        solution.computation_time = start.elapsed().as_secs_f64();
        solution
    }

    fn name(&self) -> &str {
        if self.farthest_insertion {
            "FarthestInsertion"
        } else {
            "CheapestInsertion"
        }
    }
}

/// Multi-Start Construction
///
/// Runs multiple construction heuristics and returns the best result.
/// [`NearestNeighborHeuristic`] is left out as it builds the same tour as
/// [`PathCheapestArc`].
pub struct MultiStartConstruction {
    heuristics: Vec<Box<dyn ConstructionHeuristic + Send + Sync>>,
}

impl MultiStartConstruction {
    pub fn with_all_heuristics() -> Self {
        let heuristics: Vec<Box<dyn ConstructionHeuristic + Send + Sync>> = vec![
            Box::new(PathCheapestArc::new()),
            Box::new(GreedyInsertionHeuristic::new()),
            Box::new(GreedyInsertionHeuristic::farthest()),
        ];

        MultiStartConstruction { heuristics }
    }
}

impl Default for MultiStartConstruction {
    fn default() -> Self {
        Self::with_all_heuristics()
    }
}

impl ConstructionHeuristic for MultiStartConstruction {
    fn construct(&self, instance: &TourInstance) -> Solution {
        let start = std::time::Instant::now();

        let mut best_solution = Solution::new();
        for heuristic in &self.heuristics {
            let solution = heuristic.construct(instance);
            log::debug!("{}: {} m", heuristic.name(), solution.cost);

            if solution.complete && solution.cost < best_solution.cost {
                best_solution = solution;
            }
        }

        if best_solution.tour.is_empty() {
            best_solution = PathCheapestArc::new().construct(instance);
        }

        best_solution.algorithm = self.name().to_string();
        best_solution.computation_time = start.elapsed().as_secs_f64();
        best_solution
    }

    fn name(&self) -> &str {
        "MultiStart"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DistanceMatrix;

    fn create_test_instance(close_loop: bool) -> TourInstance {
        // 0 at the origin, 1 and 3 close to it, 2 far away
        let matrix = DistanceMatrix::from_rows(vec![
            vec![0, 3, 10, 4],
            vec![3, 0, 8, 5],
            vec![10, 8, 0, 7],
            vec![4, 5, 7, 0],
        ])
        .unwrap();
        TourInstance::from_matrix(matrix, 0, close_loop).unwrap()
    }

    fn all_heuristics() -> Vec<Box<dyn ConstructionHeuristic>> {
        vec![
            Box::new(PathCheapestArc::new()),
            Box::new(NearestNeighborHeuristic::new()),
            Box::new(GreedyInsertionHeuristic::new()),
            Box::new(GreedyInsertionHeuristic::farthest()),
            Box::new(MultiStartConstruction::with_all_heuristics()),
        ]
    }

    #[test]
    fn test_path_cheapest_arc() {
        let instance = create_test_instance(true);
        let solution = PathCheapestArc::new().construct(&instance);

        // 0 -> 1 (3), 1 -> 3 (5), 3 -> 2 (7), 2 -> 0 (10)
        assert_eq!(solution.tour, vec![0, 1, 3, 2]);
        assert_eq!(solution.cost, 25);
        assert_eq!(solution.route(), vec![0, 1, 3, 2, 0]);
    }

    #[test]
    fn test_path_cheapest_arc_ties_go_to_lowest_index() {
        let instance = TourInstance::from_matrix(DistanceMatrix::constant(5, 7), 0, false).unwrap();
        let solution = PathCheapestArc::new().construct(&instance);
        assert_eq!(solution.tour, vec![0, 1, 2, 3, 4]);
        assert_eq!(solution.cost, 28);
    }

    #[test]
    fn test_nearest_neighbor_matches_path_cheapest_arc() {
        let instance = create_test_instance(false);
        let nn = NearestNeighborHeuristic::new().construct(&instance);
        let pca = PathCheapestArc::new().construct(&instance);
        assert_eq!(nn.tour, pca.tour);
        assert_eq!(nn.algorithm, "NearestNeighbor");
    }

    #[test]
    fn test_greedy_insertion() {
        let instance = create_test_instance(true);
        let solution = GreedyInsertionHeuristic::new().construct(&instance);

        assert_eq!(solution.tour.len(), 4);
        assert_eq!(solution.tour[0], 0);
        assert!(solution.complete);
        assert_eq!(solution.cost, instance.tour_cost(&solution.tour));
    }

    #[test]
    fn test_all_heuristics_produce_complete_tours_from_any_start() {
        let matrix = DistanceMatrix::from_rows(vec![
            vec![0, 3, 10, 4],
            vec![3, 0, 8, 5],
            vec![10, 8, 0, 7],
            vec![4, 5, 7, 0],
        ])
        .unwrap();

        for start in 0..4 {
            for close_loop in [true, false] {
                let instance = TourInstance::from_matrix(matrix.clone(), start, close_loop).unwrap();
                for heuristic in all_heuristics() {
                    let solution = heuristic.construct(&instance);
                    assert!(solution.complete, "{} from {}", heuristic.name(), start);
                    assert_eq!(solution.tour[0], start);
                }
            }
        }
    }

    #[test]
    fn test_single_location() {
        let instance = TourInstance::from_matrix(DistanceMatrix::constant(1, 0), 0, true).unwrap();
        for heuristic in all_heuristics() {
            let solution = heuristic.construct(&instance);
            assert_eq!(solution.tour, vec![0]);
            assert_eq!(solution.route(), vec![0, 0]);
            assert_eq!(solution.cost, 0);
        }
    }

    #[test]
    fn test_multi_start_is_no_worse_than_members() {
        let instance = create_test_instance(true);
        let best = MultiStartConstruction::with_all_heuristics().construct(&instance);
        for heuristic in all_heuristics() {
            assert!(best.cost <= heuristic.construct(&instance).cost);
        }
        assert_eq!(best.algorithm, "MultiStart");
    }

    #[test]
    fn test_multi_start_runs_distinct_heuristics() {
        let multi = MultiStartConstruction::with_all_heuristics();
        let names: Vec<&str> = multi.heuristics.iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["PathCheapestArc", "CheapestInsertion", "FarthestInsertion"]);
    }
}
