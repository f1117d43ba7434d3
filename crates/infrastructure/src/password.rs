use application::{PasswordHasher, PasswordHasherError};
use async_trait::async_trait;
use bcrypt::DEFAULT_COST;
use domain::PasswordHash;

/// bcrypt 哈希，计算放在阻塞线程池中执行。
#[derive(Debug, Clone, Copy)]
pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    pub fn new(cost: Option<u32>) -> Self {
        Self {
            cost: cost.unwrap_or(DEFAULT_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptPasswordHasher {
    fn default() -> Self {
        Self::new(None)
    }
}

async fn run_blocking<T, F>(
    task: F,
    wrap: fn(String) -> PasswordHasherError,
) -> Result<T, PasswordHasherError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, bcrypt::BcryptError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| wrap(err.to_string()))?
        .map_err(|err| wrap(err.to_string()))
}

#[async_trait]
impl PasswordHasher for BcryptPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        let cost = self.cost;
        let plaintext = plaintext.to_owned();
        let hashed = run_blocking(
            move || bcrypt::hash(plaintext, cost),
            PasswordHasherError::Hash,
        )
        .await?;
        PasswordHash::new(hashed).map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        let plaintext = plaintext.to_owned();
        let hashed = hashed.as_str().to_owned();
        run_blocking(
            move || bcrypt::verify(plaintext, &hashed),
            PasswordHasherError::Verify,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // bcrypt 允许的最小代价，测试中加快速度
    const TEST_COST: u32 = 4;

    #[tokio::test]
    async fn hash_then_verify() {
        let hasher = BcryptPasswordHasher::new(Some(TEST_COST));
        let hashed = hasher.hash("correct horse 42").await.unwrap();

        assert!(hashed.as_str().starts_with("$2"));
        assert!(hasher.verify("correct horse 42", &hashed).await.unwrap());
        assert!(!hasher.verify("wrong horse 42", &hashed).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_hash_is_a_verify_error() {
        let hasher = BcryptPasswordHasher::new(Some(TEST_COST));
        let bogus = PasswordHash::new("not-a-bcrypt-hash").unwrap();
        assert!(matches!(
            hasher.verify("whatever1", &bogus).await,
            Err(PasswordHasherError::Verify(_))
        ));
    }

    #[test]
    fn default_cost_matches_bcrypt() {
        assert_eq!(BcryptPasswordHasher::default().cost(), DEFAULT_COST);
    }
}
