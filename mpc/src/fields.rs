use ff::PrimeField;
use serde::{de::DeserializeOwned, Serialize};

/// Prime field suitable for MPC computations on embedded integers.
/// Canonical representation must be little-endian.
pub trait MpcField: PrimeField + Serialize + DeserializeOwned {
    /// Number of bits of random masks that can be added to embedded integers without overflowing the modulus.
    const SAFE_BITS: usize;

    /// Field element equal to 2^k.
    fn power_of_two(k: usize) -> Self {
        Self::from(2).pow_vartime([k as u64])
    }

    /// Field element equal to 2^(-k).
    fn power_of_two_inverse(k: usize) -> Self {
        // The modulus is odd, so two is always invertible.
        let two_inv = Self::from(2).invert().unwrap();
        two_inv.pow_vartime([k as u64])
    }

    /// Lowest 64 bits of canonical representation.
    fn truncated(&self) -> u64 {
        let repr = self.to_repr();
        let mut bytes = [0u8; 8];
        for (dst, src) in bytes.iter_mut().zip(repr.as_ref()) {
            *dst = *src;
        }
        u64::from_le_bytes(bytes)
    }
}

mod mersenne_61 {
    use ff::PrimeField;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Finite field mod 2^61-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "2305843009213693951"]
    #[PrimeFieldGenerator = "37"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne61([u64; 1]);

    impl Serialize for Mersenne61 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.to_repr().0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Mersenne61 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = Mersenne61Repr(Deserialize::deserialize(deserializer)?);
            Self::from_repr_vartime(repr)
                .ok_or_else(|| serde::de::Error::custom("Invalid field element"))
        }
    }
}

mod mersenne_127 {
    use ff::PrimeField;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Finite field mod 2^127-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "170141183460469231731687303715884105727"]
    #[PrimeFieldGenerator = "43"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne127([u64; 2]);

    impl Serialize for Mersenne127 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.to_repr().0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Mersenne127 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = Mersenne127Repr(Deserialize::deserialize(deserializer)?);
            Self::from_repr_vartime(repr)
                .ok_or_else(|| serde::de::Error::custom("Invalid field element"))
        }
    }
}

pub use mersenne_127::{Mersenne127, Mersenne127Repr};
pub use mersenne_61::{Mersenne61, Mersenne61Repr};

impl MpcField for Mersenne61 {
    const SAFE_BITS: usize = 59;
}

impl MpcField for Mersenne127 {
    const SAFE_BITS: usize = 125;
}
