use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::message::{Domain, Identifier, OperationKey};

/// Количество компонентов ключа сущности.
pub const KEY_PARTS: usize = 4;

/// Один компонент шаблона ключа.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternComponent {
    /// Точное совпадение со значением.
    Literal(Identifier),
    /// Совпадает с любым значением, включая NULL.
    Wildcard,
    /// Совпадает только с NULL.
    Null,
}

/// Шаблон ключа сущности: четыре упорядоченных компонента.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKeyPattern {
    pub parts: [PatternComponent; KEY_PARTS],
}

impl EntityKeyPattern {
    pub fn new(parts: [PatternComponent; KEY_PARTS]) -> Self {
        Self { parts }
    }

    /// Шаблон из четырёх wildcard: совпадает с любым ключом.
    pub fn any() -> Self {
        Self {
            parts: [
                PatternComponent::Wildcard,
                PatternComponent::Wildcard,
                PatternComponent::Wildcard,
                PatternComponent::Wildcard,
            ],
        }
    }
}

/// Конкретный ключ сущности: значения или NULL, без wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub parts: [Option<Identifier>; KEY_PARTS],
}

impl EntityKey {
    pub fn new(parts: [Option<Identifier>; KEY_PARTS]) -> Self {
        Self { parts }
    }
}

/// Конкретный ключ маршрутизации одного опубликованного обновления.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateKey {
    pub domain: Domain,
    pub area: u16,
    pub service: u16,
    pub operation: u16,
    pub key: EntityKey,
}

/// Одно публикуемое обновление: ключ маршрутизации плюс непрозрачная
/// полезная нагрузка.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub key: UpdateKey,
    pub payload: Bytes,
}

/// Подписка потребителя: домен-префикс плюс набор шаблонов ключей.
///
/// Повторная регистрация с тем же id замещает подписку целиком.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Identifier,
    pub domain: Domain,
    pub patterns: Vec<EntityKeyPattern>,
}

/// Декларация издателя: под какими ключами он обещает публиковать.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherDeclaration {
    pub domain: Domain,
    pub patterns: Vec<EntityKeyPattern>,
}

/// Домен-префикс: `prefix` целиком совпадает с началом `domain`.
///
/// Подписка на `a.b` видит обновления под `a.b.c`, но не под `a` и не под
/// `x.b`. Именно префикс, не подстрока.
pub fn domain_matches(prefix: &[Identifier], domain: &[Identifier]) -> bool {
    prefix.len() <= domain.len() && prefix.iter().zip(domain).all(|(p, d)| p == d)
}

/// Сопоставление ключа с шаблоном по четырём позициям.
///
/// Первый несовпавший компонент обрывает проверку.
pub fn key_matches(pattern: &EntityKeyPattern, key: &EntityKey) -> bool {
    pattern
        .parts
        .iter()
        .zip(&key.parts)
        .all(|(pat, value)| match pat {
            PatternComponent::Wildcard => true,
            PatternComponent::Null => value.is_none(),
            PatternComponent::Literal(lit) => value.as_ref() == Some(lit),
        })
}

/// Полная проверка: подходит ли обновление под подписку в рамках привязки
/// брокера `scope`.
///
/// Два отдельных шага — префикс домена и покомпонентный шаблон — плюс
/// точное равенство номеров области/службы/операции; wildcard на уровне
/// номеров не существует.
pub fn subscription_matches(sub: &Subscription, scope: &OperationKey, update: &UpdateKey) -> bool {
    if update.area != scope.area
        || update.service != scope.service
        || update.operation != scope.operation
    {
        return false;
    }
    if !domain_matches(&sub.domain, &update.domain) {
        return false;
    }
    sub.patterns.iter().any(|p| key_matches(p, &update.key))
}

/// Покрыта ли публикация декларацией издателя.
pub fn declaration_covers(decl: &PublisherDeclaration, update: &UpdateKey) -> bool {
    domain_matches(&decl.domain, &update.domain)
        && decl.patterns.iter().any(|p| key_matches(p, &update.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::domain;

    fn ident(s: &str) -> Identifier {
        Identifier::new(s)
    }

    fn concrete(parts: [Option<&str>; KEY_PARTS]) -> EntityKey {
        EntityKey::new(parts.map(|p| p.map(Identifier::new)))
    }

    /// Тест проверяет, что полный wildcard совпадает с любым ключом.
    #[test]
    fn test_all_wildcard_matches_everything() {
        let pattern = EntityKeyPattern::any();
        assert!(key_matches(&pattern, &concrete([Some("a"), Some("b"), None, Some("d")])));
        assert!(key_matches(&pattern, &concrete([None, None, None, None])));
    }

    /// Тест проверяет, что NULL-матчер пропускает только NULL.
    #[test]
    fn test_null_matcher_only_null() {
        let pattern = EntityKeyPattern::new([
            PatternComponent::Null,
            PatternComponent::Wildcard,
            PatternComponent::Wildcard,
            PatternComponent::Wildcard,
        ]);
        assert!(key_matches(&pattern, &concrete([None, Some("x"), None, None])));
        assert!(!key_matches(&pattern, &concrete([Some("x"), None, None, None])));
    }

    /// Тест проверяет литеральный компонент: точное равенство, NULL не
    /// подходит.
    #[test]
    fn test_literal_component() {
        let pattern = EntityKeyPattern::new([
            PatternComponent::Literal(ident("wheel1")),
            PatternComponent::Wildcard,
            PatternComponent::Wildcard,
            PatternComponent::Wildcard,
        ]);
        assert!(key_matches(&pattern, &concrete([Some("wheel1"), None, None, None])));
        assert!(!key_matches(&pattern, &concrete([Some("wheel2"), None, None, None])));
        assert!(!key_matches(&pattern, &concrete([None, None, None, None])));
    }

    /// Тест проверяет правило префикса домена:
    /// ["a","b"] покрывает ["a","b","c"], но не ["a"] и не ["x","b"].
    #[test]
    fn test_domain_prefix_rule() {
        let prefix = domain(["a", "b"]);
        assert!(domain_matches(&prefix, &domain(["a", "b"])));
        assert!(domain_matches(&prefix, &domain(["a", "b", "c"])));
        assert!(!domain_matches(&prefix, &domain(["a"])));
        assert!(!domain_matches(&prefix, &domain(["x", "b"])));
    }

    /// Тест проверяет, что номера области/службы/операции сравниваются
    /// строго, без wildcard.
    #[test]
    fn test_numbers_exact() {
        let sub = Subscription {
            id: ident("s1"),
            domain: domain(["a"]),
            patterns: vec![EntityKeyPattern::any()],
        };
        let scope = OperationKey::new(1, 1, 2, 3);
        let mut update = UpdateKey {
            domain: domain(["a"]),
            area: 1,
            service: 2,
            operation: 3,
            key: concrete([None, None, None, None]),
        };
        assert!(subscription_matches(&sub, &scope, &update));

        update.service = 9;
        assert!(!subscription_matches(&sub, &scope, &update));
    }

    /// Тест проверяет, что декларация издателя покрывает обновление по
    /// тем же правилам домена и шаблонов.
    #[test]
    fn test_declaration_covers() {
        let decl = PublisherDeclaration {
            domain: domain(["a", "b"]),
            patterns: vec![EntityKeyPattern::new([
                PatternComponent::Literal(ident("k")),
                PatternComponent::Wildcard,
                PatternComponent::Wildcard,
                PatternComponent::Wildcard,
            ])],
        };
        let covered = UpdateKey {
            domain: domain(["a", "b", "c"]),
            area: 1,
            service: 1,
            operation: 1,
            key: concrete([Some("k"), Some("v"), None, None]),
        };
        let uncovered = UpdateKey {
            key: concrete([Some("other"), None, None, None]),
            ..covered.clone()
        };
        assert!(declaration_covers(&decl, &covered));
        assert!(!declaration_covers(&decl, &uncovered));
    }
}
