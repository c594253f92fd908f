#![allow(clippy::too_many_arguments)]
#![allow(missing_docs)]

use alloy::sol;

sol!(
    /// mesh token contract
    #[sol(rpc)]
    #[derive(Debug)]
    contract MeshToken {
        event Staked(address indexed user, uint256 amount, uint256 totalStaked);
        event Unstaked(address indexed user, uint256 amount, uint256 totalStaked);
        event Transfer(address indexed from, address indexed to, uint256 value);
        event RelayPaid(address indexed payer, address indexed relayer, uint256 amount, uint256 feeBurned);
        event EpochRewardsDistributed(uint256 indexed epoch, uint256 totalRewards, uint256 recipientCount);

        function balanceOf(address account) external view returns (uint256);
        function votingPower(address user) external view returns (uint256);
        function totalStaked() external view returns (uint256);
        function currentEpoch() external view returns (uint256);
        function canDistributeRewards() external view returns (bool);

        function distributeEpochRewards(address[] recipients, uint256[] uptimes) external;
        function setRelayerAuthorized(address relayer, bool authorized) external;
    }
);
