//! Single-pass greedy clustering of unmatched messages.

use std::collections::HashSet;

/// A cluster of similar unmatched messages. The representative is the
/// message that seeded the cluster.
#[derive(Debug, Clone)]
pub struct MessageCluster {
    pub representative: String,
    pub examples: Vec<String>,
    tokens: HashSet<String>,
}

impl MessageCluster {
    #[must_use]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

fn tokenize(message: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    message
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 3)
        .filter(|t| seen.insert((*t).to_string()))
        .map(ToString::to_string)
        .collect()
}

/// Greedy single-pass clustering: a message joins the first cluster sharing
/// at least two tokens (one for short messages), otherwise seeds a new
/// cluster. Order-dependent; deterministic for a fixed input order.
#[must_use]
pub fn cluster_messages(messages: &[String]) -> Vec<MessageCluster> {
    let mut clusters: Vec<MessageCluster> = Vec::new();

    for message in messages {
        let tokens = tokenize(message);
        let needed = if tokens.len() <= 3 { 1 } else { 2 };

        let joined = clusters.iter_mut().find(|cluster| {
            tokens.iter().filter(|t| cluster.tokens.contains(*t)).count() >= needed
        });

        match joined {
            Some(cluster) => {
                cluster.examples.push(message.clone());
                cluster.tokens.extend(tokens);
            }
            None => clusters.push(MessageCluster {
                representative: message.clone(),
                examples: vec![message.clone()],
                tokens: tokens.into_iter().collect(),
            }),
        }
    }

    clusters
}

/// Heuristic route pattern for a cluster: the representative's tokens that
/// appear in every member, joined by `.*`.
#[must_use]
pub fn suggest_pattern(cluster: &MessageCluster) -> String {
    let member_tokens: Vec<HashSet<String>> = cluster
        .examples
        .iter()
        .map(|m| tokenize(m).into_iter().collect())
        .collect();

    let common: Vec<String> = tokenize(&cluster.representative)
        .into_iter()
        .filter(|t| member_tokens.iter().all(|tokens| tokens.contains(t)))
        .collect();

    if common.is_empty() {
        tokenize(&cluster.representative)
            .into_iter()
            .take(3)
            .collect::<Vec<_>>()
            .join(".*")
    } else {
        common.join(".*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn similar_messages_cluster_together() {
        let clusters = cluster_messages(&msgs(&[
            "price check BTC0",
            "price check BTC1",
            "price check BTC2",
            "price check BTC3",
            "price check BTC4",
        ]));
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 5);
        assert_eq!(clusters[0].representative, "price check BTC0");
    }

    #[test]
    fn unrelated_messages_stay_apart() {
        let clusters = cluster_messages(&msgs(&[
            "price check bitcoin today",
            "weather forecast tomorrow morning",
        ]));
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn short_messages_join_on_one_token() {
        // Three or fewer qualifying tokens need only one shared token.
        let clusters = cluster_messages(&msgs(&["check wallet", "wallet balance"]));
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 2);
    }

    #[test]
    fn token_union_grows_the_cluster() {
        // Third message shares tokens only via the second's contribution.
        let clusters = cluster_messages(&msgs(&[
            "audit token contract",
            "audit token liquidity pool",
            "liquidity pool depth",
        ]));
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn suggested_pattern_joins_common_tokens() {
        let clusters = cluster_messages(&msgs(&[
            "price check BTC0",
            "price check BTC1",
            "price check BTC2",
        ]));
        let pattern = suggest_pattern(&clusters[0]);
        assert!(pattern.contains("price"));
        assert!(pattern.contains("check"));
        assert!(pattern.contains(".*"));
        assert!(!pattern.contains("btc0"));
    }

    #[test]
    fn pattern_falls_back_to_representative_tokens() {
        let cluster = MessageCluster {
            representative: "alpha beta gamma".into(),
            examples: vec!["alpha beta gamma".into(), "delta epsilon zeta".into()],
            tokens: HashSet::new(),
        };
        let pattern = suggest_pattern(&cluster);
        assert_eq!(pattern, "alpha.*beta.*gamma");
    }

    #[test]
    fn empty_input_empty_output() {
        assert!(cluster_messages(&[]).is_empty());
    }

    #[test]
    fn deterministic_for_fixed_order() {
        let input = msgs(&["swap usdc for eth", "swap usdc amount", "stake tokens now"]);
        let a = cluster_messages(&input);
        let b = cluster_messages(&input);
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].representative, b[0].representative);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn every_message_lands_in_exactly_one_cluster(messages in proptest::collection::vec(".*", 0..20)) {
            let clusters = cluster_messages(&messages);
            let total: usize = clusters.iter().map(MessageCluster::len).sum();
            prop_assert_eq!(total, messages.len());
        }

        #[test]
        fn suggest_pattern_never_panics(messages in proptest::collection::vec("[a-z ]{0,40}", 1..10)) {
            for cluster in cluster_messages(&messages) {
                let _ = suggest_pattern(&cluster);
            }
        }
    }
}
