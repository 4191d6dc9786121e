use crate::instruction::LedgerInstruction;
use crate::Address;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    pub sender: Address,
    pub nonce: u64,
    pub instruction: LedgerInstruction,
}

impl Transaction {
    pub fn new(sender: Address, nonce: u64, instruction: LedgerInstruction) -> Self {
        Self {
            sender,
            nonce,
            instruction,
        }
    }

    pub fn signing_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// blake3 over the bincode encoding. Encoding a plain enum of integers and byte arrays
    /// does not fail; an empty buffer is hashed if it ever does.
    pub fn id(&self) -> [u8; 32] {
        use blake3::Hasher;
        let mut hasher = Hasher::new();
        hasher.update(&self.signing_bytes().unwrap_or_default());
        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_depends_on_nonce() {
        let ix = LedgerInstruction::Supply {
            asset: [1; 32],
            amount: 5,
        };
        let a = Transaction::new([2; 32], 0, ix.clone());
        let b = Transaction::new([2; 32], 1, ix);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }
}
