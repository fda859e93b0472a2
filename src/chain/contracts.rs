// src/chain/contracts.rs
//
// Only the functions this service calls are declared.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface ISubscriptionManager {
        struct Subscription {
            uint256 planId;
            uint256 startTime;
            uint256 endTime;
            bool isActive;
            uint8 paymentMethod;
        }

        function createPlan(uint256 pricePerMonth, uint256 duration, string metadata) external returns (uint256);
        function subscribe(uint256 planId) external;
        function grantSubscription(address subscriber, uint256 planId) external;
        function isSubscriptionActive(address subscriber, uint256 planId) external view returns (bool);
        function getSubscription(address subscriber, uint256 planId) external view returns (Subscription memory);
    }
}

sol! {
    #[sol(rpc)]
    interface IPayPerViewManager {
        function registerContent(bytes32 contentId, uint256 price, string metadata) external;
        function buyView(bytes32 contentId) external;
        function grantAccess(address buyer, bytes32 contentId) external;
        function hasAccess(address viewer, bytes32 contentId) external view returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
    }
}

sol! {
    #[sol(rpc)]
    interface ICreatorToken {
        function holdsCreatorToken(address holder, address creator) external view returns (uint256 balance);
    }
}
