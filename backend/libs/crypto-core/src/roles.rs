//! Roles and permissions carried by identity claims
//!
//! Both sets are closed: a role string that is not listed here makes the
//! enclosing token undecodable, and every role maps to an explicit permission
//! set checked exhaustively at compile time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller role as issued by the auth backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    TeamLead,
    FinanceClerk,
    Clerk,
    Staff,
    Customer,
}

/// Action a role may perform against a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    // Orders
    CreateOrder,
    ViewOrder,
    UpdateOrder,
    DeleteOrder,
    VoidOrder,
    RefundOrder,
    // Payments
    ProcessPayment,
    ViewPayment,
    RefundPayment,
    // Menu
    CreateItem,
    UpdateItem,
    DeleteItem,
    ViewItem,
    // Inventory
    ManageStock,
    ViewStock,
    AdjustStock,
    // Tables
    ManageTable,
    ViewTable,
    AssignTable,
    // Reporting
    ViewReports,
    ExportReports,
    // Users
    ManageUsers,
    ViewUsers,
    CreateUser,
    UpdateUser,
    DeleteUser,
    // Settings
    ManageSettings,
    ViewSettings,
}

use Permission::*;

#[rustfmt::skip]
const ADMIN_PERMISSIONS: &[Permission] = &[
    CreateOrder, ViewOrder, UpdateOrder, DeleteOrder, VoidOrder, RefundOrder,
    ProcessPayment, ViewPayment, RefundPayment,
    CreateItem, UpdateItem, DeleteItem, ViewItem,
    ManageStock, ViewStock, AdjustStock,
    ManageTable, ViewTable, AssignTable,
    ViewReports, ExportReports,
    ManageUsers, ViewUsers, CreateUser, UpdateUser, DeleteUser,
    ManageSettings, ViewSettings,
];

#[rustfmt::skip]
const MANAGER_PERMISSIONS: &[Permission] = &[
    CreateOrder, ViewOrder, UpdateOrder,
    ProcessPayment, ViewPayment,
    CreateItem, UpdateItem, ViewItem,
    ManageStock, ViewStock,
    ManageTable, ViewTable,
    ViewReports, ExportReports,
    ViewUsers,
    ViewSettings,
];

#[rustfmt::skip]
const TEAM_LEAD_PERMISSIONS: &[Permission] = &[
    CreateOrder, ViewOrder, UpdateOrder,
    ProcessPayment, ViewPayment,
    ViewItem,
    ViewStock,
    ManageTable, ViewTable, AssignTable,
    ViewReports,
];

#[rustfmt::skip]
const FINANCE_CLERK_PERMISSIONS: &[Permission] = &[
    ViewOrder, RefundOrder,
    ProcessPayment, ViewPayment, RefundPayment,
    ViewItem,
    ViewReports, ExportReports,
];

#[rustfmt::skip]
const CLERK_PERMISSIONS: &[Permission] = &[
    CreateOrder, ViewOrder,
    ProcessPayment, ViewPayment,
    ViewItem,
    ViewStock,
    ViewTable,
];

#[rustfmt::skip]
const STAFF_PERMISSIONS: &[Permission] = &[
    CreateOrder, ViewOrder,
    ViewItem,
    ViewTable, AssignTable,
];

const CUSTOMER_PERMISSIONS: &[Permission] = &[ViewItem];

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Admin,
        Role::Manager,
        Role::TeamLead,
        Role::FinanceClerk,
        Role::Clerk,
        Role::Staff,
        Role::Customer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::TeamLead => "teamlead",
            Role::FinanceClerk => "financeclerk",
            Role::Clerk => "clerk",
            Role::Staff => "staff",
            Role::Customer => "customer",
        }
    }

    /// Position in the role hierarchy, higher is more privileged
    pub fn rank(&self) -> u8 {
        match self {
            Role::Admin => 7,
            Role::Manager => 6,
            Role::TeamLead => 5,
            Role::FinanceClerk => 4,
            Role::Clerk => 3,
            Role::Staff => 2,
            Role::Customer => 1,
        }
    }

    /// True when this role is at least as privileged as `required`
    pub fn satisfies(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Admin => ADMIN_PERMISSIONS,
            Role::Manager => MANAGER_PERMISSIONS,
            Role::TeamLead => TEAM_LEAD_PERMISSIONS,
            Role::FinanceClerk => FINANCE_CLERK_PERMISSIONS,
            Role::Clerk => CLERK_PERMISSIONS,
            Role::Staff => STAFF_PERMISSIONS,
            Role::Customer => CUSTOMER_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
