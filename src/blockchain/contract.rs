// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contract bindings for presence verification.

use alloy::{
    primitives::{Address, Bytes},
    sol,
    sol_types::SolCall,
};

// Presence contract interface (alloy's sol! macro)
sol! {
    /// Contract a client is paired with; the node attests proximity to it.
    interface IPresenceVerifier {
        function verifyPresence(address client, uint64 time) external;
    }

    /// Registry announcing which contract each client wants verified by which node.
    interface IPresenceRegistry {
        event PresenceRequested(
            address indexed node,
            address indexed client,
            address authority,
            address contractAddress
        );
    }
}

/// ABI-encoded `verifyPresence(client, time)` call.
pub fn verify_presence_calldata(client: Address, time: u64) -> Bytes {
    IPresenceVerifier::verifyPresenceCall { client, time }
        .abi_encode()
        .into()
}
