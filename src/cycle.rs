//! 已启用但未满足组件之间的依赖图。
//!
//! 当 B 发布的接口正是 A 某个未满足的必需引用所要求的，即有边 `A -> B`。
//! 查找用显式栈的迭代 DFS 加访问集，每个节点与边至多检查一次。
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
pub struct GraphNode {
    pub name: String,
    pub provides: Vec<String>,
    pub requires: Vec<String>,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn build(nodes: impl IntoIterator<Item = GraphNode>) -> Self {
        let nodes: Vec<GraphNode> = nodes.into_iter().collect();
        let mut providers: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, n) in nodes.iter().enumerate() {
            for interface in &n.provides {
                providers.entry(interface.as_str()).or_default().push(i);
            }
        }
        let edges = nodes
            .iter()
            .map(|n| {
                let mut out: Vec<usize> = n
                    .requires
                    .iter()
                    .flat_map(|i| providers.get(i.as_str()).into_iter().flatten().copied())
                    .collect();
                out.sort_unstable();
                out.dedup();
                out
            })
            .collect();
        let names: Vec<String> = nodes.into_iter().map(|n| n.name).collect();
        let index = names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();
        Self { names, index, edges }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 路径 `origin -> ... -> last`，末节点又依赖 `origin`
    pub fn find_cycle(&self, origin: &str) -> Option<Vec<String>> {
        let start = *self.index.get(origin)?;
        let mut visited = HashSet::new();
        visited.insert(start);
        // (节点, 下一条待查边)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        while let Some(top) = stack.last_mut() {
            let (node, cursor) = *top;
            let Some(&next) = self.edges[node].get(cursor) else {
                stack.pop();
                continue;
            };
            top.1 += 1;
            if next == start {
                return Some(stack.iter().map(|(n, _)| self.names[*n].clone()).collect());
            }
            if visited.insert(next) {
                stack.push((next, 0));
            }
        }
        None
    }
}
