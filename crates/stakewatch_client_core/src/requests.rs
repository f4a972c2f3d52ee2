//! User-side deposit and withdrawal requests. Forms are validated before any
//! request is sent; a rejected form never creates a record.

use crate::api::{eq, SupabaseClient};
use crate::config::WithdrawalLimits;
use crate::error::Result;
use crate::ids::UserId;
use crate::models::{BlockchainNetwork, Deposit, NewDeposit, NewWithdrawal, RequestStatus, Withdrawal};

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a valid amount")]
    InvalidAmount,
    #[error("Minimum withdrawal amount is ${min}")]
    BelowMinimum { min: f64 },
    #[error("Maximum withdrawal amount is ${max}")]
    AboveMaximum { max: f64 },
    #[error("Insufficient balance. Available: ${available:.2}")]
    ExceedsAvailable { available: f64 },
    #[error("Please enter your wallet address")]
    MissingAddress,
    #[error("Please select a network")]
    MissingNetwork,
    #[error("Network {0} is not available")]
    UnknownNetwork(String),
    #[error("Please upload a transaction screenshot")]
    MissingProof,
    #[error("{0}")]
    Field(String),
}

fn parse_amount(raw: &str) -> Result<f64, ValidationError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(ValidationError::InvalidAmount),
    }
}

#[derive(Clone, Debug, Default)]
pub struct WithdrawalForm {
    pub amount: String,
    pub address: String,
    pub network: String,
}

impl WithdrawalForm {
    /// Amount once every check passes. `available` is the withdrawable profit.
    pub fn validate(&self, limits: &WithdrawalLimits, available: f64) -> Result<f64, ValidationError> {
        let amount = parse_amount(&self.amount)?;
        if amount < limits.min {
            return Err(ValidationError::BelowMinimum { min: limits.min });
        }
        if amount > limits.max {
            return Err(ValidationError::AboveMaximum { max: limits.max });
        }
        if amount > available {
            return Err(ValidationError::ExceedsAvailable { available });
        }
        if self.address.trim().is_empty() {
            return Err(ValidationError::MissingAddress);
        }
        if self.network.trim().is_empty() {
            return Err(ValidationError::MissingNetwork);
        }
        Ok(amount)
    }
}

#[derive(Clone, Debug)]
pub struct Screenshot {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct DepositForm {
    pub amount: String,
    /// Network name as listed in `blockchain_networks`.
    pub network: String,
    pub screenshot: Option<Screenshot>,
}

impl DepositForm {
    /// Amount plus the selected network (whose address the deposit records).
    pub fn validate<'n>(
        &self,
        networks: &'n [BlockchainNetwork],
    ) -> Result<(f64, &'n BlockchainNetwork), ValidationError> {
        let amount = parse_amount(&self.amount)?;
        let name = self.network.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingNetwork);
        }
        let network = networks
            .iter()
            .find(|n| n.is_enabled && n.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ValidationError::UnknownNetwork(name.to_string()))?;
        match &self.screenshot {
            Some(s) if !s.bytes.is_empty() => Ok((amount, network)),
            _ => Err(ValidationError::MissingProof),
        }
    }
}

pub async fn list_networks(client: &SupabaseClient) -> Result<Vec<BlockchainNetwork>> {
    client
        .select(
            "blockchain_networks",
            &[("is_enabled", eq(true)), ("order", "name.asc".to_string())],
        )
        .await
}

/// Upload the proof to `{user_id}/{uuid}-{file}` and record a pending deposit.
pub async fn submit_deposit(
    client: &SupabaseClient,
    form: &DepositForm,
    networks: &[BlockchainNetwork],
) -> Result<Deposit> {
    let user = client.user_id()?;
    let (amount, network) = form.validate(networks)?;
    let screenshot = form
        .screenshot
        .as_ref()
        .ok_or(crate::error::Error::Validation(ValidationError::MissingProof))?;
    let path = format!("{}/{}-{}", user, uuid::Uuid::new_v4(), screenshot.file_name);
    let bucket = client.config().screenshot_bucket.clone();
    client
        .upload_object(&bucket, &path, screenshot.bytes.clone(), &screenshot.content_type)
        .await?;
    let body = NewDeposit {
        user_id: user,
        amount,
        blockchain: network.name.clone(),
        deposit_address: network.deposit_address.clone(),
        transaction_screenshot: Some(client.public_object_url(&bucket, &path)),
        status: RequestStatus::Pending,
    };
    let deposit: Deposit = client.insert("deposits", &body).await?;
    log::info!("deposit: submitted id={} amount={} network={}", deposit.id, amount, network.name);
    Ok(deposit)
}

/// Record a pending withdrawal. `available` is the caller's current profit.
pub async fn submit_withdrawal(
    client: &SupabaseClient,
    form: &WithdrawalForm,
    available: f64,
) -> Result<Withdrawal> {
    let user = client.user_id()?;
    let amount = form.validate(&client.config().withdrawal, available)?;
    let body = NewWithdrawal {
        user_id: user,
        amount,
        blockchain: form.network.trim().to_string(),
        wallet_address: form.address.trim().to_string(),
        status: RequestStatus::Pending,
    };
    let withdrawal: Withdrawal = client.insert("withdrawals", &body).await?;
    log::info!("withdrawal: submitted id={} amount={}", withdrawal.id, amount);
    Ok(withdrawal)
}

pub async fn my_deposits(client: &SupabaseClient, user: UserId) -> Result<Vec<Deposit>> {
    client
        .select("deposits", &[("user_id", eq(user)), ("order", "created_at.desc".to_string())])
        .await
}

pub async fn my_withdrawals(client: &SupabaseClient, user: UserId) -> Result<Vec<Withdrawal>> {
    client
        .select("withdrawals", &[("user_id", eq(user)), ("order", "created_at.desc".to_string())])
        .await
}
