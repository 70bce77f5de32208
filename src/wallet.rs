//! Key holder and transaction builder.

use log::warn;

use crate::crypto::{generate_keypair, public_key_to_address, sign};
use crate::error::WalletError;
use crate::transaction::{Transaction, TransactionInput, TransactionOutput, UnlockScript};
use crate::utxo::UtxoSet;

const DUST_THRESHOLD: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct Wallet {
    pub private_key_hex: String,
    pub public_key_hex: String,
    pub address: String,
}

impl Wallet {
    pub fn generate() -> Self {
        let (private_key_hex, public_key_hex) = generate_keypair();
        let address = public_key_to_address(&public_key_hex);
        Wallet { private_key_hex, public_key_hex, address }
    }

    /// Selects UTXOs owned by this wallet, builds an output to `recipient`
    /// for `amount` plus a change output back to self, signs the whole
    /// transaction once, and stamps every input's unlock script with that
    /// same signature (all inputs share the same signing payload under
    /// this model).
    pub fn create_transaction(
        &self,
        recipient: &str,
        amount: f64,
        fee: f64,
        utxo: &UtxoSet,
    ) -> Result<Transaction, WalletError> {
        let owned = utxo.find_for_address(&self.address);
        if owned.is_empty() {
            return Err(WalletError::NoUtxos(self.address.clone()));
        }

        let mut candidates: Vec<_> = owned.into_iter().collect();
        candidates.sort_by(|a, b| a.1.amount.partial_cmp(&b.1.amount).unwrap());

        let needed = amount + fee;
        let mut selected = Vec::new();
        let mut total = 0.0f64;
        for (key, output) in candidates {
            selected.push((key, output.clone()));
            total += output.amount;
            if total >= needed {
                break;
            }
        }

        if total < needed {
            return Err(WalletError::InsufficientFunds { needed, available: total });
        }

        let inputs: Vec<TransactionInput> = selected
            .iter()
            .map(|((tx_id, idx), _)| TransactionInput {
                transaction_id: tx_id.clone(),
                output_index: *idx,
                unlock_script: UnlockScript::empty(),
            })
            .collect();

        let mut outputs = vec![TransactionOutput::new(crate::chain::round8(amount), recipient.to_string())];
        let change = crate::chain::round8(total - amount - fee);
        if change > DUST_THRESHOLD {
            outputs.push(TransactionOutput::new(change, self.address.clone()));
        }

        let unsigned = Transaction::new(inputs, outputs);
        let data_to_sign = unsigned.get_data_to_sign();
        let signature = sign(&self.private_key_hex, &data_to_sign).ok_or_else(|| {
            warn!("wallet {}: failed to sign outgoing transaction", self.address);
            WalletError::NoUtxos(self.address.clone())
        })?;

        let mut tx = unsigned;
        for input in tx.inputs.iter_mut() {
            input.unlock_script = UnlockScript::Signature {
                signature: signature.clone(),
                public_key: self.public_key_hex.clone(),
            };
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_transaction_spends_owned_utxo_and_pays_change() {
        let wallet = Wallet::generate();
        let mut utxo = UtxoSet::new();
        utxo.add("src".into(), 0, TransactionOutput::new(50.0, wallet.address.clone()));

        let tx = wallet.create_transaction("bob-address", 10.0, 1.0, &utxo).unwrap();
        assert_eq!(tx.outputs[0].amount, 10.0);
        assert_eq!(tx.outputs[0].lock_script, "bob-address");
        assert_eq!(tx.outputs[1].amount, 39.0);
        assert_eq!(tx.outputs[1].lock_script, wallet.address);

        let data = tx.get_data_to_sign();
        let (sig, pk) = tx.inputs[0].unlock_script.as_signature().unwrap();
        assert!(crate::crypto::verify(pk, &data, sig));
    }

    #[test]
    fn create_transaction_fails_with_no_utxos() {
        let wallet = Wallet::generate();
        let utxo = UtxoSet::new();
        let result = wallet.create_transaction("bob", 10.0, 1.0, &utxo);
        assert!(matches!(result, Err(WalletError::NoUtxos(_))));
    }

    #[test]
    fn create_transaction_fails_when_insufficient() {
        let wallet = Wallet::generate();
        let mut utxo = UtxoSet::new();
        utxo.add("src".into(), 0, TransactionOutput::new(1.0, wallet.address.clone()));
        let result = wallet.create_transaction("bob", 10.0, 1.0, &utxo);
        assert!(matches!(result, Err(WalletError::InsufficientFunds { .. })));
    }
}
