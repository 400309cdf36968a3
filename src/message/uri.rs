use std::{fmt, sync::Arc};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Пул для повторного использования `Arc<str>` по одинаковым строкам.
///
/// URI и идентификаторы повторяются в каждом заголовке сообщения, поэтому
/// держим по одному `Arc<str>` на строку: сравнение ключей таблицы
/// транзакций и реестра подписок сводится к сравнению коротких строк без
/// лишних аллокаций.
static STR_INTERN: Lazy<DashMap<String, Arc<str>>> = Lazy::new(DashMap::new);

/// Возвращает interned `Arc<str>` для данной строки.
#[inline(always)]
fn intern<S: AsRef<str>>(value: S) -> Arc<str> {
    let key = value.as_ref();
    if let Some(existing) = STR_INTERN.get(key) {
        existing.clone()
    } else {
        let s = key.to_string();
        let arc: Arc<str> = Arc::from(s.clone());
        STR_INTERN.insert(s, arc.clone());
        arc
    }
}

/// Адрес конечной точки (строковый URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri(Arc<str>);

impl Uri {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(intern(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Uri {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Uri {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for Uri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

/// Идентификатор: имя в домене, ключе сущности или имени сессии.
///
/// Тот же interned `Arc<str>`, что и [`Uri`], но отдельный тип, чтобы
/// адреса и имена не перемешивались в сигнатурах.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Arc<str>);

impl Identifier {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(intern(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

/// Упорядоченный список идентификаторов домена.
pub type Domain = Vec<Identifier>;

/// Собирает домен из строковых срезов.
pub fn domain<I, S>(parts: I) -> Domain
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts.into_iter().map(Identifier::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Проверяет, что одинаковые URI интернируются в один Arc.
    #[test]
    fn test_uri_interned() {
        let a = Uri::new("orb://ground/archive");
        let b = Uri::new("orb://ground/archive");
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0), "одинаковые URI - один Arc");
    }

    /// Проверяет, что разные строки дают разные значения.
    #[test]
    fn test_uri_distinct() {
        let a = Uri::new("one");
        let b = Uri::new("two");
        assert_ne!(a, b);
    }

    /// Проверяет сборку домена из срезов и порядок элементов.
    #[test]
    fn test_domain_helper_keeps_order() {
        let d = domain(["sat1", "aocs", "wheels"]);
        assert_eq!(d.len(), 3);
        assert_eq!(d[0].as_str(), "sat1");
        assert_eq!(d[2].as_str(), "wheels");
    }
}
