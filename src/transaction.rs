//! Transaction types and validation for meshchain

use crate::blockchain::Blockchain;
use crate::crypto::{self, Address, KeyPair};
use crate::error::ChainError;

/// A signed value transfer. `from` and `to` are hex public keys; `gas` is the
/// fee paid to the miner of the block that confirms the transfer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    #[serde(default)]
    pub gas: u64,
    pub signature: Option<Vec<u8>>,
}

impl Transaction {
    pub fn new(from: Address, to: Address, amount: u64, gas: u64) -> Self {
        Transaction {
            from,
            to,
            amount,
            gas,
            signature: None,
        }
    }

    /// Canonical, order-preserving byte encoding of the signed fields.
    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(self.from.as_bytes());
        message.extend_from_slice(self.to.as_bytes());
        message.extend_from_slice(&self.amount.to_le_bytes());
        message.extend_from_slice(&self.gas.to_le_bytes());
        message
    }

    /// Canonical encoding including the signature, used for block hashing.
    /// A transaction is immutable once signed.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = self.signable_message();
        if let Some(signature) = &self.signature {
            bytes.extend_from_slice(signature);
        }
        bytes
    }

    /// Signs the transaction. Fails when the signing key's public address does
    /// not equal `from`; only the sender can authorize a transfer.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), ChainError> {
        if keypair.address() != self.from {
            return Err(ChainError::CryptoError(
                "Signing key does not match sender address".to_string(),
            ));
        }
        let signature = keypair.sign(&self.signable_message())?;
        self.signature = Some(signature.to_vec());
        Ok(())
    }

    /// Validates the transaction against the balances derived from `chain`.
    ///
    /// The mint address is exempt from the balance check: it is the nominal
    /// sender of newly issued coins and its balance goes negative by design of
    /// the issuance model. Balance lookup rescans the whole chain on every
    /// call, which is acceptable at the chain sizes this node targets.
    pub fn validate(&self, chain: &Blockchain) -> Result<(), ChainError> {
        if self.from.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Sender address cannot be empty".to_string(),
            ));
        }
        if self.to.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Recipient address cannot be empty".to_string(),
            ));
        }
        if self.amount == 0 {
            return Err(ChainError::InvalidTransaction(
                "Amount must be greater than zero".to_string(),
            ));
        }

        if self.from != crypto::mint_address() {
            let spend = self.amount.checked_add(self.gas).ok_or_else(|| {
                ChainError::InvalidTransaction("Amount plus gas overflows".to_string())
            })?;
            let balance = chain.balance_of(&self.from);
            if (balance as i128) < spend as i128 {
                return Err(ChainError::InvalidTransaction(format!(
                    "Insufficient balance: sender has {} but amount + gas is {}",
                    balance, spend
                )));
            }
        }

        let signature = match &self.signature {
            Some(signature) => signature,
            None => {
                return Err(ChainError::InvalidTransaction(
                    "Transaction not signed".to_string(),
                ))
            }
        };
        crypto::verify_signature(&self.from, &self.signable_message(), signature)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Blockchain;
    use crate::crypto::KeyPair;

    fn funded_chain() -> (Blockchain, KeyPair) {
        let keypair = KeyPair::generate().unwrap();
        let chain = Blockchain::new(&keypair.address()).unwrap();
        (chain, keypair)
    }

    #[test]
    fn test_sign_and_validate() {
        let (chain, sender) = funded_chain();
        let recipient = KeyPair::generate().unwrap();

        let mut tx = Transaction::new(sender.address(), recipient.address(), 500, 10);
        tx.sign(&sender).unwrap();

        assert!(tx.validate(&chain).is_ok());
    }

    #[test]
    fn test_sign_with_mismatched_key_fails() {
        let sender = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();

        let mut tx = Transaction::new(sender.address(), other.address(), 500, 0);
        let result = tx.sign(&other);

        assert!(result.is_err());
        assert!(tx.signature.is_none());
    }

    #[test]
    fn test_unsigned_transaction_is_invalid() {
        let (chain, sender) = funded_chain();
        let recipient = KeyPair::generate().unwrap();

        let tx = Transaction::new(sender.address(), recipient.address(), 500, 0);
        let result = tx.validate(&chain);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not signed"));
    }

    #[test]
    fn test_tampered_amount_fails_verification() {
        let (chain, sender) = funded_chain();
        let recipient = KeyPair::generate().unwrap();

        let mut tx = Transaction::new(sender.address(), recipient.address(), 500, 10);
        tx.sign(&sender).unwrap();
        tx.amount = 600;

        assert!(tx.validate(&chain).is_err());
    }

    #[test]
    fn test_zero_amount_is_invalid() {
        let (chain, sender) = funded_chain();
        let recipient = KeyPair::generate().unwrap();

        let mut tx = Transaction::new(sender.address(), recipient.address(), 0, 10);
        tx.sign(&sender).unwrap();

        assert!(tx.validate(&chain).is_err());
    }

    #[test]
    fn test_overspend_is_invalid() {
        let (chain, sender) = funded_chain();
        let recipient = KeyPair::generate().unwrap();

        // Genesis issuance is 100_000; spending all of it leaves nothing for gas.
        let mut tx = Transaction::new(sender.address(), recipient.address(), 100_000, 1);
        tx.sign(&sender).unwrap();

        let result = tx.validate(&chain);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Insufficient balance"));
    }

    #[test]
    fn test_mint_is_balance_exempt() {
        let (chain, _) = funded_chain();
        let recipient = KeyPair::generate().unwrap();

        // Far more than the mint identity "has"; issuance is unconstrained.
        let mut tx = Transaction::new(crypto::mint_address(), recipient.address(), 10_000_000, 0);
        tx.sign(crypto::mint_keypair()).unwrap();

        assert!(tx.validate(&chain).is_ok());
    }
}
