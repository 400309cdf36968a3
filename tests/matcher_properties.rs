//! Property-based тесты сопоставления ключей подписки.
//!
//! Генерируются случайные домены, шаблоны и конкретные ключи; проверяются
//! законы матчера, которые обязаны выполняться на любых входах.

use orbita::{
    broker::{domain_matches, key_matches, subscription_matches},
    EntityKey, EntityKeyPattern, Identifier, OperationKey, PatternComponent, Subscription,
    UpdateKey,
};
use proptest::prelude::*;

const PROPTEST_CASES: u32 = 512;

fn ident_strategy() -> impl Strategy<Value = Identifier> {
    "[a-d]{1,3}".prop_map(Identifier::new)
}

fn domain_strategy() -> impl Strategy<Value = Vec<Identifier>> {
    prop::collection::vec(ident_strategy(), 0..4)
}

fn component_strategy() -> impl Strategy<Value = PatternComponent> {
    prop_oneof![
        Just(PatternComponent::Wildcard),
        Just(PatternComponent::Null),
        ident_strategy().prop_map(PatternComponent::Literal),
    ]
}

fn pattern_strategy() -> impl Strategy<Value = EntityKeyPattern> {
    [
        component_strategy(),
        component_strategy(),
        component_strategy(),
        component_strategy(),
    ]
    .prop_map(EntityKeyPattern::new)
}

fn part_strategy() -> impl Strategy<Value = Option<Identifier>> {
    prop::option::of(ident_strategy())
}

fn key_strategy() -> impl Strategy<Value = EntityKey> {
    [
        part_strategy(),
        part_strategy(),
        part_strategy(),
        part_strategy(),
    ]
    .prop_map(EntityKey::new)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    /// Полный wildcard совпадает с любым ключом.
    #[test]
    fn prop_all_wildcard_matches_any(key in key_strategy()) {
        prop_assert!(key_matches(&EntityKeyPattern::any(), &key));
    }

    /// Шаблон, собранный из самого ключа (литералы + NULL), совпадает
    /// со своим ключом.
    #[test]
    fn prop_key_matches_itself(key in key_strategy()) {
        let pattern = EntityKeyPattern::new(key.parts.clone().map(|part| match part {
            Some(value) => PatternComponent::Literal(value),
            None => PatternComponent::Null,
        }));
        prop_assert!(key_matches(&pattern, &key));
    }

    /// NULL-компонент шаблона не совпадает с конкретным значением, а
    /// литерал — с NULL.
    #[test]
    fn prop_null_and_literal_disjoint(value in ident_strategy()) {
        let null_pattern = EntityKeyPattern::new([
            PatternComponent::Null,
            PatternComponent::Wildcard,
            PatternComponent::Wildcard,
            PatternComponent::Wildcard,
        ]);
        let concrete = EntityKey::new([Some(value.clone()), None, None, None]);
        prop_assert!(!key_matches(&null_pattern, &concrete));

        let literal_pattern = EntityKeyPattern::new([
            PatternComponent::Literal(value),
            PatternComponent::Wildcard,
            PatternComponent::Wildcard,
            PatternComponent::Wildcard,
        ]);
        let null_key = EntityKey::new([None, None, None, None]);
        prop_assert!(!key_matches(&literal_pattern, &null_key));
    }

    /// Префикс домена совпадает с любым его расширением.
    #[test]
    fn prop_domain_prefix_matches_extension(
        prefix in domain_strategy(),
        tail in domain_strategy(),
    ) {
        let mut full = prefix.clone();
        full.extend(tail);
        prop_assert!(domain_matches(&prefix, &full));
    }

    /// Домен короче префикса никогда не совпадает.
    #[test]
    fn prop_domain_shorter_than_prefix_fails(
        prefix in domain_strategy(),
        extra in ident_strategy(),
    ) {
        let mut longer = prefix.clone();
        longer.push(extra);
        prop_assert!(!domain_matches(&longer, &prefix));
    }

    /// Несовпадение номеров области/службы/операции отсекает обновление
    /// при любых шаблонах.
    #[test]
    fn prop_scope_numbers_gate(
        pattern in pattern_strategy(),
        key in key_strategy(),
        service in 1u16..100,
    ) {
        let sub = Subscription {
            id: Identifier::new("s"),
            domain: vec![],
            patterns: vec![pattern],
        };
        let scope = OperationKey::new(1, 1, service, 1);
        let update = UpdateKey {
            domain: vec![],
            area: 1,
            service: service + 1,
            operation: 1,
            key,
        };
        prop_assert!(!subscription_matches(&sub, &scope, &update));
    }

    /// Если совпал хоть один шаблон подписки, совпала и подписка целиком.
    #[test]
    fn prop_any_pattern_suffices(
        miss in pattern_strategy(),
        key in key_strategy(),
    ) {
        let sub = Subscription {
            id: Identifier::new("s"),
            domain: vec![],
            patterns: vec![miss, EntityKeyPattern::any()],
        };
        let scope = OperationKey::new(1, 1, 1, 1);
        let update = UpdateKey {
            domain: vec![],
            area: 1,
            service: 1,
            operation: 1,
            key,
        };
        prop_assert!(subscription_matches(&sub, &scope, &update));
    }
}
