// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Response code reference tables
//!
//! Names and descriptions follow TPM 2.0 Library Part 2, section 6.6.3
//! (`TPM_RC`). Each table is sorted by code so lookups can binary search.

/// Symbolic name and description of a single response code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcDetails {
    pub code: u32,
    pub name: &'static str,
    pub description: &'static str,
}

const fn rc(code: u32, name: &'static str, description: &'static str) -> RcDetails {
    RcDetails {
        code,
        name,
        description,
    }
}

/// Format-zero codes defined by TPM 2.0 (`RC_VER1` + code)
pub static VER1_CODES: &[RcDetails] = &[
    rc(
        0x000,
        "TPM_RC_INITIALIZE",
        "TPM not initialized by TPM2_Startup or already initialized commands not being accepted because of a TPM failure",
    ),
    rc(0x001, "TPM_RC_FAILURE", "commands not being accepted because of a TPM failure"),
    rc(0x003, "TPM_RC_SEQUENCE", "improper use of a sequence handle"),
    rc(0x00B, "TPM_RC_PRIVATE", "not currently used"),
    rc(0x019, "TPM_RC_HMAC", "not currently used"),
    rc(0x020, "TPM_RC_DISABLED", "the command is disabled"),
    rc(0x021, "TPM_RC_EXCLUSIVE", "command failed because audit sequence required exclusivity"),
    rc(0x024, "TPM_RC_AUTH_TYPE", "authorization handle is not correct for command"),
    rc(
        0x025,
        "TPM_RC_AUTH_MISSING",
        "command requires an authorization session for handle and it is not present.",
    ),
    rc(0x026, "TPM_RC_POLICY", "policy failure in math operation or an invalid authPolicy value"),
    rc(0x027, "TPM_RC_PCR", "PCR check fail"),
    rc(0x028, "TPM_RC_PCR_CHANGED", "PCR have changed since checked."),
    rc(
        0x02D,
        "TPM_RC_UPGRADE",
        "for all commands other than TPM2_FieldUpgradeData(), this code indicates that the TPM is in field upgrade mode; for TPM2_FieldUpgradeData(), this code indicates that the TPM is not in field upgrade mode",
    ),
    rc(0x02E, "TPM_RC_TOO_MANY_CONTEXTS", "context ID counter is at maximum."),
    rc(
        0x02F,
        "TPM_RC_AUTH_UNAVAILABLE",
        "authValue or authPolicy is not available for selected entity.",
    ),
    rc(
        0x030,
        "TPM_RC_REBOOT",
        "a _TPM_Init and Startup(CLEAR) is required before the TPM can resume operation.",
    ),
    rc(
        0x031,
        "TPM_RC_UNBALANCED",
        "the protection algorithms (hash and symmetric) are not reasonably balanced. The digest size of the hash must be larger than the key size of the symmetric algorithm.  This may be returned by TPM2_GetTestResult() as the testResult parameter.",
    ),
    rc(
        0x042,
        "TPM_RC_COMMAND_SIZE",
        "command commandSize value is inconsistent with contents of the command buffer; either the size is not the same as the octets loaded by the hardware interface layer or the value is not large enough to hold a command header",
    ),
    rc(0x043, "TPM_RC_COMMAND_CODE", "command code not supported"),
    rc(
        0x044,
        "TPM_RC_AUTHSIZE",
        "the value of authorizationSize is out of range or the number of octets in the Authorization Area is greater than required",
    ),
    rc(
        0x045,
        "TPM_RC_AUTH_CONTEXT",
        "use of an authorization session with a context command or another command that cannot have an authorization session.",
    ),
    rc(0x046, "TPM_RC_NV_RANGE", "NV offset+size is out of range."),
    rc(0x047, "TPM_RC_NV_SIZE", "Requested allocation size is larger than allowed."),
    rc(0x048, "TPM_RC_NV_LOCKED", "NV access locked."),
    rc(
        0x049,
        "TPM_RC_NV_AUTHORIZATION",
        "NV access authorization fails in command actions (this failure does not affect lockout.action)",
    ),
    rc(
        0x04A,
        "TPM_RC_NV_UNINITIALIZED",
        "an NV Index is used before being initialized or the state saved by TPM2_Shutdown(STATE) could not be restored",
    ),
    rc(0x04B, "TPM_RC_NV_SPACE", "insufficient space for NV allocation"),
    rc(0x04C, "TPM_RC_NV_DEFINED", "NV Index or persistent object already defined"),
    rc(0x050, "TPM_RC_BAD_CONTEXT", "context in TPM2_ContextLoad() is not valid"),
    rc(0x051, "TPM_RC_CPHASH", "cpHash value already set or not correct for use"),
    rc(0x052, "TPM_RC_PARENT", "handle for parent is not a valid parent"),
    rc(0x053, "TPM_RC_NEEDS_TEST", "some function needs testing."),
    rc(
        0x054,
        "TPM_RC_NO_RESULT",
        "returned when an internal function cannot process a request due to an unspecified problem. This code is usually related to invalid parameters that are not properly filtered by the input unmarshaling code.",
    ),
    rc(
        0x055,
        "TPM_RC_SENSITIVE",
        "the sensitive area did not unmarshal correctly after decryption – this code is used in lieu of the other unmarshaling errors so that an attacker cannot determine where the unmarshaling error occurred",
    ),
];

/// Format-one codes (`RC_FMT1` + code), qualified by handle, parameter or session
pub static FMT1_CODES: &[RcDetails] = &[
    rc(0x001, "TPM_RC_ASYMMETRIC", "asymmetric algorithm not supported or not correct"),
    rc(0x002, "TPM_RC_ATTRIBUTES", "inconsistent attributes"),
    rc(0x003, "TPM_RC_HASH", "hash algorithm not supported or not appropriate"),
    rc(0x004, "TPM_RC_VALUE", "value is out of range or is not correct for the context"),
    rc(0x005, "TPM_RC_HIERARCHY", "hierarchy is not enabled or is not correct for the use"),
    rc(0x007, "TPM_RC_KEY_SIZE", "key size is not supported"),
    rc(0x008, "TPM_RC_MGF", "mask generation function not supported"),
    rc(0x009, "TPM_RC_MODE", "mode of operation not supported"),
    rc(0x00A, "TPM_RC_TYPE", "the type of the value is not appropriate for the use"),
    rc(0x00B, "TPM_RC_HANDLE", "the handle is not correct for the use"),
    rc(
        0x00C,
        "TPM_RC_KDF",
        "unsupported key derivation function or function not appropriate for use",
    ),
    rc(0x00D, "TPM_RC_RANGE", "value was out of allowed range."),
    rc(0x00E, "TPM_RC_AUTH_FAIL", "the authorization HMAC check failed and DA counter incremented"),
    rc(0x00F, "TPM_RC_NONCE", "invalid nonce size or nonce value mismatch"),
    rc(0x010, "TPM_RC_PP", "authorization requires assertion of PP"),
    rc(0x012, "TPM_RC_SCHEME", "unsupported or incompatible scheme"),
    rc(0x015, "TPM_RC_SIZE", "structure is the wrong size"),
    rc(
        0x016,
        "TPM_RC_SYMMETRIC",
        "unsupported symmetric algorithm or key size, or not appropriate for instance",
    ),
    rc(0x017, "TPM_RC_TAG", "incorrect structure tag"),
    rc(0x018, "TPM_RC_SELECTOR", "union selector is incorrect"),
    rc(
        0x01A,
        "TPM_RC_INSUFFICIENT",
        "the TPM was unable to unmarshal a value because there were not enough octets in the input buffer",
    ),
    rc(0x01B, "TPM_RC_SIGNATURE", "the signature is not valid"),
    rc(0x01C, "TPM_RC_KEY", "key fields are not compatible with the selected use"),
    rc(0x01D, "TPM_RC_POLICY_FAIL", "a policy check failed"),
    rc(0x01F, "TPM_RC_INTEGRITY", "integrity check failed"),
    rc(0x020, "TPM_RC_TICKET", "invalid ticket"),
    rc(0x021, "TPM_RC_RESERVED_BITS", "reserved bits not set to zero as required"),
    rc(0x022, "TPM_RC_BAD_AUTH", "authorization failure without DA implications"),
    rc(0x023, "TPM_RC_EXPIRED", "the policy has expired"),
    rc(
        0x024,
        "TPM_RC_POLICY_CC",
        "the commandCode in the policy is not the commandCode of the command or the command code in a policy command references a command that is not implemented",
    ),
    rc(
        0x025,
        "TPM_RC_BINDING",
        "public and sensitive portions of an object are not cryptographically bound",
    ),
    rc(0x026, "TPM_RC_CURVE", "curve not supported"),
    rc(0x027, "TPM_RC_ECC_POINT", "point is not on the required curve."),
];

/// Format-zero warnings (`RC_WARN` + code)
pub static WARNING_CODES: &[RcDetails] = &[
    rc(0x001, "TPM_RC_CONTEXT_GAP", "gap for context ID is too large"),
    rc(0x002, "TPM_RC_OBJECT_MEMORY", "out of memory for object contexts"),
    rc(0x003, "TPM_RC_SESSION_MEMORY", "out of memory for session contexts"),
    rc(
        0x004,
        "TPM_RC_MEMORY",
        "out of shared object/session memory or need space for internal operations",
    ),
    rc(
        0x005,
        "TPM_RC_SESSION_HANDLES",
        "out of session handles – a session must be flushed before a new session may be created out of object handles – the handle space for objects is depleted and a reboot is required",
    ),
    rc(
        0x006,
        "TPM_RC_OBJECT_HANDLES",
        "out of object handles – the handle space for objects is depleted and a reboot is required",
    ),
    rc(0x007, "TPM_RC_LOCALITY", "bad locality"),
    rc(
        0x008,
        "TPM_RC_YIELDED",
        "the TPM has suspended operation on the command; forward progress was made and the command may be retried",
    ),
    rc(0x009, "TPM_RC_CANCELED", "the command was canceled"),
    rc(0x00A, "TPM_RC_TESTING", "TPM is performing self-tests"),
    rc(
        0x010,
        "TPM_RC_REFERENCE_H0",
        "the 1st handle in the handle area references a transient object or session that is not loaded",
    ),
    rc(
        0x011,
        "TPM_RC_REFERENCE_H1",
        "the 2nd handle in the handle area references a transient object or session that is not loaded",
    ),
    rc(
        0x012,
        "TPM_RC_REFERENCE_H2",
        "the 3rd handle in the handle area references a transient object or session that is not loaded",
    ),
    rc(
        0x013,
        "TPM_RC_REFERENCE_H3",
        "the 4th handle in the handle area references a transient object or session that is not loaded",
    ),
    rc(
        0x014,
        "TPM_RC_REFERENCE_H4",
        "the 5th handle in the handle area references a transient object or session that is not loaded",
    ),
    rc(
        0x015,
        "TPM_RC_REFERENCE_H5",
        "the 6th handle in the handle area references a transient object or session that is not loaded",
    ),
    rc(
        0x016,
        "TPM_RC_REFERENCE_H6",
        "the 7th handle in the handle area references a transient object or session that is not loaded",
    ),
    rc(
        0x018,
        "TPM_RC_REFERENCE_S0",
        "the 1st authorization session handle references a session that is not loaded",
    ),
    rc(
        0x019,
        "TPM_RC_REFERENCE_S1",
        "the 2nd authorization session handle references a session that is not loaded",
    ),
    rc(
        0x01A,
        "TPM_RC_REFERENCE_S2",
        "the 3rd authorization session handle references a session that is not loaded",
    ),
    rc(
        0x01B,
        "TPM_RC_REFERENCE_S3",
        "the 4th authorization session handle references a session that is not loaded",
    ),
    rc(
        0x01C,
        "TPM_RC_REFERENCE_S4",
        "the 5th session handle references a session that is not loaded",
    ),
    rc(
        0x01D,
        "TPM_RC_REFERENCE_S5",
        "the 6th session handle references a session that is not loaded",
    ),
    rc(
        0x01E,
        "TPM_RC_REFERENCE_S6",
        "the 7th authorization session handle references a session that is not loaded",
    ),
    rc(0x020, "TPM_RC_NV_RATE", "the TPM is rate-limiting accesses to prevent wearout of NV"),
    rc(
        0x021,
        "TPM_RC_LOCKOUT",
        "authorizations for objects subject to DA protection are not allowed at this time because the TPM is in DA lockout mode",
    ),
    rc(0x022, "TPM_RC_RETRY", "the TPM was not able to start the command"),
    rc(
        0x023,
        "TPM_RC_NV_UNAVAILABLE",
        "the command may require writing of NV and NV is not current accessible",
    ),
    rc(0x07F, "TPM_RC_NOT_USED", "this value is reserved and shall not be returned by the TPM"),
];

fn find(table: &'static [RcDetails], code: u32) -> Option<&'static RcDetails> {
    table
        .binary_search_by_key(&code, |entry| entry.code)
        .ok()
        .map(|idx| &table[idx])
}

/// Look up a format-zero TPM 2.0 error code
pub fn ver1(code: u32) -> Option<&'static RcDetails> {
    find(VER1_CODES, code)
}

/// Look up a format-one error code
pub fn fmt1(code: u32) -> Option<&'static RcDetails> {
    find(FMT1_CODES, code)
}

/// Look up a warning code
pub fn warning(code: u32) -> Option<&'static RcDetails> {
    find(WARNING_CODES, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sorted(table: &[RcDetails]) {
        for pair in table.windows(2) {
            assert!(
                pair[0].code < pair[1].code,
                "table not sorted at 0x{:03x}",
                pair[1].code
            );
        }
    }

    #[test]
    fn test_tables_sorted() {
        assert_sorted(VER1_CODES);
        assert_sorted(FMT1_CODES);
        assert_sorted(WARNING_CODES);
    }

    #[test]
    fn test_names_carry_rc_prefix() {
        for entry in VER1_CODES.iter().chain(FMT1_CODES).chain(WARNING_CODES) {
            assert!(entry.name.starts_with("TPM_RC_"), "{}", entry.name);
            assert!(!entry.description.is_empty());
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(ver1(0x001).map(|d| d.name), Some("TPM_RC_FAILURE"));
        assert_eq!(fmt1(0x004).map(|d| d.name), Some("TPM_RC_VALUE"));
        assert_eq!(warning(0x022).map(|d| d.name), Some("TPM_RC_RETRY"));
        assert_eq!(warning(0x07F).map(|d| d.name), Some("TPM_RC_NOT_USED"));
        assert!(ver1(0x002).is_none());
        assert!(fmt1(0x03F).is_none());
    }
}
