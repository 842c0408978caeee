use ember_trie::EMPTY_ROOT;
use primitive_types::{H256, U256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// `keccak("")`, the code hash of an account without code.
pub const EMPTY_CODE_HASH: H256 = H256([
	0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
	0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
	0xa4, 0x70,
]);

/// Account payload stored in the state trie: `rlp([nonce, balance,
/// storage_root, code_hash])`. Storage and code live outside the account
/// and are referenced by hash.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Account {
	pub nonce: U256,
	pub balance: U256,
	pub storage_root: H256,
	pub code_hash: H256,
}

impl Default for Account {
	fn default() -> Self {
		Account {
			nonce: U256::zero(),
			balance: U256::zero(),
			storage_root: EMPTY_ROOT,
			code_hash: EMPTY_CODE_HASH,
		}
	}
}

impl Account {
	/// Whether the account is indistinguishable from a non-existent one.
	pub fn is_blank(&self) -> bool {
		self.nonce.is_zero()
			&& self.balance.is_zero()
			&& self.storage_root == EMPTY_ROOT
			&& self.code_hash == EMPTY_CODE_HASH
	}
}

impl Encodable for Account {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(4);
		s.append(&self.nonce);
		s.append(&self.balance);
		s.append(&self.storage_root);
		s.append(&self.code_hash);
	}
}

impl Decodable for Account {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 4 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(Account {
			nonce: rlp.val_at(0)?,
			balance: rlp.val_at(1)?,
			storage_root: rlp.val_at(2)?,
			code_hash: rlp.val_at(3)?,
		})
	}
}
